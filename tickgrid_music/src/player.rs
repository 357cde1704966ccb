// Players: the bridge from phrases to channel messages.
//
// A player is one output channel with one program and one phrase type. It
// keeps only the phrases of its own type; any others handed to it are
// dropped. Building walks the song's pattern instances in order, lets every
// owned phrase generate against each one, and turns each note into a
// NoteOn/NoteOff pair on the player's channel.
//
// Channel 9 is the GM percussion channel, so a player there selects a drum
// kit rather than an instrument. Both are sent as a program change at the
// start of the build. A player that owns no phrases emits nothing at all.

use tracing::debug;

use crate::error::{LookupError, Result};
use crate::gm;
use crate::message::{CHANNEL_COUNT, ChannelMessage, DRUM_CHANNEL, TimedMessage};
use crate::phrase::{Phrase, PhraseType};
use crate::song::Song;

/// What a player selects on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Instrument(u8),
    DrumKit(u8),
}

impl Program {
    /// Look up `name` as a drum kit on the percussion channel, as an
    /// instrument anywhere else.
    pub fn for_channel(channel: u8, name: &str) -> Result<Self, LookupError> {
        if channel == DRUM_CHANNEL {
            gm::drum_kit(name).map(Program::DrumKit)
        } else {
            gm::instrument(name).map(Program::Instrument)
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Program::Instrument(n) | Program::DrumKit(n) => n,
        }
    }
}

/// Whether a build is feeding live playback or a full export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Playback,
    /// Always builds the whole song, whatever start tick is requested.
    Export,
}

#[derive(Debug, Clone)]
pub struct Player {
    channel: u8,
    program: Program,
    phrase_type: PhraseType,
    phrases: Vec<Phrase>,
}

impl Player {
    pub fn new(channel: u8, program: Program, phrase_type: PhraseType) -> Result<Self, LookupError> {
        if channel >= CHANNEL_COUNT {
            return Err(LookupError::ChannelOutOfRange(channel));
        }
        Ok(Self {
            channel,
            program,
            phrase_type,
            phrases: Vec::new(),
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn program(&self) -> Program {
        self.program
    }

    pub fn phrase_type(&self) -> PhraseType {
        self.phrase_type
    }

    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    /// Take ownership of the phrases matching this player's type.
    pub fn adopt(&mut self, phrases: impl IntoIterator<Item = Phrase>) {
        let wanted = self.phrase_type;
        self.phrases
            .extend(phrases.into_iter().filter(|p| p.phrase_type() == wanted));
    }

    /// Generate every owned phrase over the instances starting at or after
    /// `from_tick` and return the resulting messages in generation order.
    pub fn build(
        &mut self,
        song: &Song,
        from_tick: u32,
        mode: BuildMode,
    ) -> Result<Vec<TimedMessage>> {
        if self.phrases.is_empty() {
            debug!(
                channel = self.channel,
                kind = %self.phrase_type,
                "player has no phrases"
            );
            return Ok(Vec::new());
        }
        let from_tick = match mode {
            BuildMode::Playback => from_tick,
            BuildMode::Export => 0,
        };
        let channel = self.channel;
        let mut out = vec![TimedMessage::new(
            from_tick,
            ChannelMessage::ProgramChange {
                channel,
                program: self.program.number(),
            },
        )];
        for instance in song.instances_from(from_tick) {
            for phrase in &mut self.phrases {
                let notes = phrase.generate(instance.start, song.tonality, &instance.pattern)?;
                for note in notes {
                    out.push(TimedMessage::new(
                        note.tick,
                        ChannelMessage::NoteOn {
                            channel,
                            pitch: note.pitch,
                            velocity: note.velocity,
                        },
                    ));
                    out.push(TimedMessage::new(
                        note.tick + note.gate,
                        ChannelMessage::NoteOff {
                            channel,
                            pitch: note.pitch,
                        },
                    ));
                }
            }
        }
        debug!(channel, messages = out.len(), "built player");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Resolution;
    use crate::notation::{Pattern, parse_pitched_grid};
    use crate::phrase::{BASS_INTERVAL, PitchedVoice, Strategy};
    use crate::song::Tonality;
    use crate::theory::{Key, Mode};

    fn bass_phrase(name: &str, grid: &str) -> Phrase {
        let voice = PitchedVoice::new(parse_pitched_grid(grid).unwrap(), BASS_INTERVAL);
        Phrase::new(name, Strategy::Bass(voice), Resolution::default(), 127)
    }

    fn song() -> Song {
        let mut song = Song::new(Tonality::new(Key::C, Mode::Ionian), Resolution::default());
        song.push(Arc::new(Pattern::parse("a", "[I | | | ]").unwrap()));
        song.push(Arc::new(Pattern::parse("b", "[V | | | ]").unwrap()));
        song.push(Arc::new(Pattern::parse("a", "[I | | | ]").unwrap()));
        song
    }

    fn bass_player() -> Player {
        let mut player = Player::new(1, Program::Instrument(38), PhraseType::Bass).unwrap();
        player.adopt([
            bass_phrase("a", "1>--|----|----|----"),
            bass_phrase("b", "5---|----|----|----"),
        ]);
        player
    }

    #[test]
    fn test_build_pairs_note_on_and_off() {
        let mut player = bass_player();
        let msgs = player.build(&song(), 0, BuildMode::Playback).unwrap();
        assert_eq!(
            msgs[0],
            TimedMessage::new(0, ChannelMessage::ProgramChange { channel: 1, program: 38 })
        );
        let ons: Vec<u32> = msgs
            .iter()
            .filter(|m| matches!(m.message, ChannelMessage::NoteOn { .. }))
            .map(|m| m.tick)
            .collect();
        assert_eq!(ons, vec![0, 1920, 3840]);
        assert!(msgs.contains(&TimedMessage::new(
            240,
            ChannelMessage::NoteOff { channel: 1, pitch: 36 }
        )));
        // V step 5 is D, two octaves under D5.
        assert!(msgs.contains(&TimedMessage::new(
            1920,
            ChannelMessage::NoteOn { channel: 1, pitch: 50, velocity: 127 }
        )));
    }

    #[test]
    fn test_build_from_tick_skips_earlier_instances() {
        let mut player = bass_player();
        let msgs = player.build(&song(), 1920, BuildMode::Playback).unwrap();
        assert_eq!(msgs[0].tick, 1920);
        assert!(msgs.iter().all(|m| m.tick >= 1920));
        assert_eq!(msgs.len(), 1 + 2 * 2);
    }

    #[test]
    fn test_export_always_builds_from_zero() {
        let mut player = bass_player();
        let msgs = player.build(&song(), 1920, BuildMode::Export).unwrap();
        assert_eq!(msgs[0].tick, 0);
        assert_eq!(msgs.len(), 1 + 3 * 2);
    }

    #[test]
    fn test_adopt_filters_by_type() {
        let mut player = Player::new(2, Program::Instrument(0), PhraseType::Pad).unwrap();
        player.adopt([bass_phrase("a", "1---|----|----|----")]);
        assert!(player.phrases().is_empty());
        let msgs = player.build(&song(), 0, BuildMode::Playback).unwrap();
        assert!(msgs.is_empty());
    }

    #[test]
    fn test_program_for_channel() {
        assert_eq!(
            Program::for_channel(9, "Jazz").unwrap(),
            Program::DrumKit(32)
        );
        assert_eq!(
            Program::for_channel(0, "Synth_Bass_1").unwrap(),
            Program::Instrument(38)
        );
        assert!(Program::for_channel(0, "Jazz").is_err());
        assert!(matches!(
            Player::new(16, Program::Instrument(0), PhraseType::Bass),
            Err(LookupError::ChannelOutOfRange(16))
        ));
    }
}
