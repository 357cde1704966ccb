// Mixer faders: channel volume and pan by player type.
//
// A fader names a phrase type rather than a channel. It applies to every
// player of that type and is sent once, at tick 0, ahead of anything the
// players produce. A fader whose type no player has does nothing.

use std::str::FromStr;

use crate::error::LookupError;
use crate::message::{CC_PAN, CC_VOLUME, ChannelMessage, TimedMessage};
use crate::phrase::PhraseType;
use crate::player::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pan {
    Left,
    Center,
    Right,
    Value(u8),
}

impl Pan {
    pub fn value(self) -> u8 {
        match self {
            Pan::Left => 0,
            Pan::Center => 64,
            Pan::Right => 127,
            Pan::Value(v) => v,
        }
    }
}

impl FromStr for Pan {
    type Err = LookupError;

    /// `left`, `center` (or `centre`), `right`, or a number 0-127.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "left" | "l" => Ok(Pan::Left),
            "center" | "centre" | "c" => Ok(Pan::Center),
            "right" | "r" => Ok(Pan::Right),
            other => match other.parse::<u32>() {
                Ok(value) if value <= 127 => Ok(Pan::Value(value as u8)),
                Ok(value) => Err(LookupError::ValueOutOfRange { what: "pan", value }),
                Err(_) => Err(LookupError::UnknownPan(s.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fader {
    pub player_type: PhraseType,
    pub volume: u8,
    pub pan: Pan,
    pub mute: bool,
}

impl Fader {
    pub fn new(player_type: PhraseType, volume: u32, pan: Pan, mute: bool) -> Result<Self, LookupError> {
        if volume > 127 {
            return Err(LookupError::ValueOutOfRange {
                what: "volume",
                value: volume,
            });
        }
        Ok(Self {
            player_type,
            volume: volume as u8,
            pan,
            mute,
        })
    }

    fn messages_for(&self, channel: u8) -> [ChannelMessage; 2] {
        let volume = if self.mute { 0 } else { self.volume };
        [
            ChannelMessage::Controller {
                channel,
                controller: CC_VOLUME,
                value: volume,
            },
            ChannelMessage::Controller {
                channel,
                controller: CC_PAN,
                value: self.pan.value(),
            },
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mixer {
    faders: Vec<Fader>,
}

impl Mixer {
    pub fn new(faders: Vec<Fader>) -> Self {
        Self { faders }
    }

    pub fn faders(&self) -> &[Fader] {
        &self.faders
    }

    /// Control messages for every player a fader addresses, all at tick 0.
    pub fn messages(&self, players: &[Player]) -> Vec<TimedMessage> {
        self.faders
            .iter()
            .flat_map(|fader| {
                players
                    .iter()
                    .filter(move |p| p.phrase_type() == fader.player_type)
                    .flat_map(move |p| fader.messages_for(p.channel()))
            })
            .map(|message| TimedMessage::new(0, message))
            .collect()
    }
}
