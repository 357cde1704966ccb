// Standard MIDI File output for an exported message stream.
//
// Writes SMF Format 1: track 0 carries the tempo, then one track per
// channel that appears in the stream, in channel order. Absolute ticks
// become per-track deltas; the file's division is the resolution's ticks
// per quarter, so no rescaling happens here.

use std::collections::BTreeMap;
use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use tracing::info;

use crate::config::Resolution;
use crate::error::{Error, Result};
use crate::message::{ChannelMessage, TimedMessage};

const TRACK_NAMES: [&str; 16] = [
    "Channel 1",
    "Channel 2",
    "Channel 3",
    "Channel 4",
    "Channel 5",
    "Channel 6",
    "Channel 7",
    "Channel 8",
    "Channel 9",
    "Drums",
    "Channel 11",
    "Channel 12",
    "Channel 13",
    "Channel 14",
    "Channel 15",
    "Channel 16",
];

/// Write `stream` to `path` as a Standard MIDI File.
pub fn write_smf(
    stream: &[TimedMessage],
    tempo_bpm: u16,
    resolution: Resolution,
    path: &Path,
) -> Result<()> {
    let smf = stream_to_smf(stream, tempo_bpm, resolution);
    smf.save(path).map_err(|source| Error::Smf {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        tracks = smf.tracks.len(),
        messages = stream.len(),
        "wrote MIDI file"
    );
    Ok(())
}

fn to_midi(message: &ChannelMessage) -> MidiMessage {
    match *message {
        ChannelMessage::NoteOn {
            pitch, velocity, ..
        } => MidiMessage::NoteOn {
            key: u7::new(pitch),
            vel: u7::new(velocity),
        },
        ChannelMessage::NoteOff { pitch, .. } => MidiMessage::NoteOff {
            key: u7::new(pitch),
            vel: u7::new(0),
        },
        ChannelMessage::Controller {
            controller, value, ..
        } => MidiMessage::Controller {
            controller: u7::new(controller),
            value: u7::new(value),
        },
        ChannelMessage::ProgramChange { program, .. } => MidiMessage::ProgramChange {
            program: u7::new(program),
        },
    }
}

/// Convert an ordered message stream to an in-memory SMF.
fn stream_to_smf(stream: &[TimedMessage], tempo_bpm: u16, resolution: Resolution) -> Smf<'static> {
    // Resolution caps ticks per quarter well inside 15 bits.
    let division = resolution.ticks_per_quarter() as u16;
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(division)),
    ));

    let mut tempo_track: Track<'static> = Vec::new();
    let tempo_microseconds = 60_000_000 / u32::from(tempo_bpm.max(1));
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    let mut by_channel: BTreeMap<u8, Vec<&TimedMessage>> = BTreeMap::new();
    for timed in stream {
        by_channel
            .entry(timed.message.channel())
            .or_default()
            .push(timed);
    }

    for (channel, messages) in by_channel {
        let mut track: Track<'static> = Vec::with_capacity(messages.len() + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(
                TRACK_NAMES[usize::from(channel)].as_bytes(),
            )),
        });
        let mut last_tick = 0u32;
        for timed in messages {
            track.push(TrackEvent {
                delta: u28::new(timed.tick.saturating_sub(last_tick)),
                kind: TrackEventKind::Midi {
                    channel: u4::new(channel),
                    message: to_midi(&timed.message),
                },
            });
            last_tick = last_tick.max(timed.tick);
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    smf
}
