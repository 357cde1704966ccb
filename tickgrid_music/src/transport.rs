// Transport: the playback cursor and the output device it drives.
//
// The transport owns its sink outright, so playback and export cannot run
// against the same device at once: `export` is refused while playing, and
// `stop` consumes the transport, silences every channel, and hands the
// sink back.
//
// An external clock calls `advance` once per delivery quantum (a quarter
// of a sixteenth). Each call reads the current valid snapshot and
// dispatches the messages in `[position, position + quantum)`. Because the
// snapshot is re-read every call, a table published by a live rebuild takes
// effect at the next quantum without any coordination.
//
// The transport remembers which keys it left sounding. When a new table
// appears, any sounding key whose next event there is not a release is
// released at once, so an edit cannot strand a note until `stop`.
//
// Starting past tick 0 first replays the controller and program messages
// scheduled before the start, so volume, pan, mute and instruments are the
// same as for a start from the top.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::Resolution;
use crate::error::{Error, Result};
use crate::message::{CHANNEL_COUNT, ChannelMessage, TimedMessage};
use crate::scheduler::{Scheduler, Snapshot};

/// An output device for channel messages.
pub trait MidiSink {
    fn send(&mut self, tick: u32, message: &ChannelMessage);
}

/// Writes every message to the log at `info`.
#[derive(Debug, Default)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn send(&mut self, tick: u32, message: &ChannelMessage) {
        info!(tick, %message, "midi");
    }
}

/// Records everything sent to it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemorySink {
    pub sent: Vec<TimedMessage>,
}

impl MidiSink for MemorySink {
    fn send(&mut self, tick: u32, message: &ChannelMessage) {
        self.sent.push(TimedMessage::new(tick, *message));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
}

pub struct Transport<S: MidiSink> {
    scheduler: Scheduler,
    sink: S,
    resolution: Resolution,
    position: u32,
    state: TransportState,
    /// Table the last quantum was dispatched from.
    seen: Option<Arc<Snapshot>>,
    /// (channel, pitch) of every note-on not yet released.
    sounding: BTreeSet<(u8, u8)>,
}

impl<S: MidiSink> Transport<S> {
    pub fn new(scheduler: Scheduler, sink: S) -> Result<Self> {
        let resolution = scheduler.config().resolution()?;
        Ok(Self {
            scheduler,
            sink,
            resolution,
            position: 0,
            state: TransportState::Stopped,
            seen: None,
            sounding: BTreeSet::new(),
        })
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Tick of the next quantum to dispatch.
    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Begin playback at `from_tick`, snapped down to a quantum boundary.
    pub fn start(&mut self, from_tick: u32) {
        let quantum = self.resolution.quantum();
        self.position = from_tick - from_tick % quantum;
        self.state = TransportState::Playing;
        self.sounding.clear();
        let snapshot = self.scheduler.snapshot();
        let mut replayed = 0;
        for message in snapshot.table.setup_before(self.position) {
            self.sink.send(self.position, &message);
            replayed += 1;
        }
        self.seen = Some(snapshot);
        info!(position = self.position, replayed, "playback started");
    }

    /// Release sounding keys the new table no longer ends.
    fn release_orphans(&mut self, snapshot: &Snapshot) {
        let at = self.position;
        let sink = &mut self.sink;
        self.sounding.retain(|&(channel, pitch)| {
            let released = matches!(
                snapshot.table.next_note_event(at, channel, pitch),
                Some(ChannelMessage::NoteOff { .. })
            );
            if !released {
                debug!(channel, pitch, "releasing note dropped by rebuild");
                sink.send(at, &ChannelMessage::NoteOff { channel, pitch });
            }
            released
        });
    }

    /// Dispatch one quantum. Returns how many messages were sent; a stopped
    /// transport sends nothing.
    pub fn advance(&mut self) -> usize {
        if self.state != TransportState::Playing {
            return 0;
        }
        let snapshot = self.scheduler.snapshot();
        if self
            .seen
            .as_ref()
            .is_some_and(|seen| !Arc::ptr_eq(seen, &snapshot))
        {
            self.release_orphans(&snapshot);
        }
        let from = self.position;
        let to = from.saturating_add(self.resolution.quantum());
        let mut sent = 0;
        for TimedMessage { tick, message } in snapshot.table.window(from, to) {
            match message {
                ChannelMessage::NoteOn { channel, pitch, .. } => {
                    self.sounding.insert((channel, pitch));
                }
                ChannelMessage::NoteOff { channel, pitch } => {
                    self.sounding.remove(&(channel, pitch));
                }
                _ => {}
            }
            self.sink.send(tick, &message);
            sent += 1;
        }
        self.seen = Some(snapshot);
        if sent > 0 {
            trace!(from, to, sent, "dispatched quantum");
        }
        self.position = to;
        sent
    }

    /// Whether the cursor has passed every scheduled message.
    pub fn is_finished(&self) -> bool {
        let snapshot = self.scheduler.snapshot();
        snapshot
            .table
            .last_tick()
            .is_none_or(|last| self.position > last)
    }

    /// Stop playback, silence all channels, and release the sink.
    pub fn stop(mut self) -> S {
        let controller = self.scheduler.config().all_notes_off_controller;
        for channel in 0..CHANNEL_COUNT {
            self.sink.send(
                self.position,
                &ChannelMessage::Controller {
                    channel,
                    controller,
                    value: 0,
                },
            );
        }
        if self.state == TransportState::Playing {
            info!(position = self.position, "playback stopped");
        } else {
            debug!("transport released");
        }
        self.sink
    }

    /// The full linear message stream of the current table, for writing
    /// to a file. Refused while playing.
    pub fn export(&self) -> Result<Vec<TimedMessage>> {
        if self.state == TransportState::Playing {
            return Err(Error::Busy);
        }
        let snapshot = self.scheduler.snapshot();
        let stream = snapshot.table.export_stream(self.resolution.quantum());
        info!(messages = stream.len(), "exported message stream");
        Ok(stream)
    }
}
