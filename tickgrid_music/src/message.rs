// Channel messages as they leave the compiler.
//
// The table, the transport and the SMF writer all speak in terms of these
// four messages; nothing downstream sees notes or phrases.

use std::fmt;

/// Controller number for channel volume.
pub const CC_VOLUME: u8 = 7;
/// Controller number for pan.
pub const CC_PAN: u8 = 10;
/// Channel reserved for percussion by General MIDI.
pub const DRUM_CHANNEL: u8 = 9;
pub const CHANNEL_COUNT: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMessage {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
}

impl ChannelMessage {
    pub fn channel(&self) -> u8 {
        match *self {
            ChannelMessage::NoteOn { channel, .. }
            | ChannelMessage::NoteOff { channel, .. }
            | ChannelMessage::Controller { channel, .. }
            | ChannelMessage::ProgramChange { channel, .. } => channel,
        }
    }

    /// Dispatch order within a single tick. Setup messages go first, then
    /// releases, then attacks, so a note ending where another begins on the
    /// same pitch is released before it is struck again.
    pub fn priority(&self) -> u8 {
        match self {
            ChannelMessage::Controller { .. } | ChannelMessage::ProgramChange { .. } => 0,
            ChannelMessage::NoteOff { .. } => 1,
            ChannelMessage::NoteOn { .. } => 2,
        }
    }
}

impl fmt::Display for ChannelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChannelMessage::NoteOn {
                channel,
                pitch,
                velocity,
            } => write!(f, "ch{channel} note-on {pitch} vel {velocity}"),
            ChannelMessage::NoteOff { channel, pitch } => write!(f, "ch{channel} note-off {pitch}"),
            ChannelMessage::Controller {
                channel,
                controller,
                value,
            } => write!(f, "ch{channel} cc{controller}={value}"),
            ChannelMessage::ProgramChange { channel, program } => {
                write!(f, "ch{channel} program {program}")
            }
        }
    }
}

/// A message paired with its absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedMessage {
    pub tick: u32,
    pub message: ChannelMessage,
}

impl TimedMessage {
    pub fn new(tick: u32, message: ChannelMessage) -> Self {
        Self { tick, message }
    }
}
