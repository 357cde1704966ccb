// The message table: every channel message of a song, indexed by tick.
//
// A table is always built whole from a compiled composition: mixer control
// messages first (all at tick 0), then each player's messages in player
// order. Within a tick, messages are stably ordered by
// `ChannelMessage::priority`, so controllers and program changes precede
// note-offs, which precede note-ons. Two builds from the same composition
// are equal value for value.
//
// Playback reads the table a window at a time (`window`); export walks it
// from tick 0 in delivery-quantum steps until nothing is left
// (`export_stream`). Tables are immutable once built; live reload swaps
// whole tables rather than editing one.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use tracing::debug;

use crate::error::Result;
use crate::message::{ChannelMessage, TimedMessage};
use crate::player::BuildMode;
use crate::source::Composition;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTable {
    entries: BTreeMap<u32, Vec<ChannelMessage>>,
}

impl MessageTable {
    /// Index `messages` by tick, keeping arrival order within a priority.
    pub fn from_messages(messages: impl IntoIterator<Item = TimedMessage>) -> Self {
        let mut entries: BTreeMap<u32, Vec<ChannelMessage>> = BTreeMap::new();
        for TimedMessage { tick, message } in messages {
            entries.entry(tick).or_default().push(message);
        }
        for bucket in entries.values_mut() {
            bucket.sort_by_key(ChannelMessage::priority);
        }
        Self { entries }
    }

    /// Build players and mixer into a table.
    pub fn build(composition: &mut Composition, from_tick: u32, mode: BuildMode) -> Result<Self> {
        let mut messages = composition.mixer.messages(&composition.players);
        for player in &mut composition.players {
            messages.extend(player.build(&composition.song, from_tick, mode)?);
        }
        let table = Self::from_messages(messages);
        debug!(
            ticks = table.entries.len(),
            messages = table.len(),
            from_tick,
            ?mode,
            "built message table"
        );
        Ok(table)
    }

    pub fn messages_at(&self, tick: u32) -> &[ChannelMessage] {
        self.entries.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages with `from <= tick < to`, in dispatch order.
    pub fn window(&self, from: u32, to: u32) -> impl Iterator<Item = TimedMessage> + '_ {
        self.stamped(from..to)
    }

    fn stamped(&self, range: impl RangeBounds<u32>) -> impl Iterator<Item = TimedMessage> + '_ {
        self.entries
            .range(range)
            .flat_map(|(&tick, bucket)| bucket.iter().map(move |&m| TimedMessage::new(tick, m)))
    }

    /// Controller and program messages scheduled before `tick`, in
    /// dispatch order. Replaying these brings a device to the state it
    /// would have had if playback had started at tick 0.
    pub fn setup_before(&self, tick: u32) -> impl Iterator<Item = ChannelMessage> + '_ {
        self.stamped(..tick)
            .map(|m| m.message)
            .filter(|m| m.priority() == 0)
    }

    /// The first note-on or note-off for `channel`/`pitch` at or after
    /// `from`.
    pub fn next_note_event(&self, from: u32, channel: u8, pitch: u8) -> Option<ChannelMessage> {
        self.stamped(from..).map(|m| m.message).find(|m| match *m {
            ChannelMessage::NoteOn { channel: c, pitch: p, .. }
            | ChannelMessage::NoteOff { channel: c, pitch: p } => c == channel && p == pitch,
            _ => false,
        })
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The whole table as one linear stream, collected one `quantum` window
    /// at a time from tick 0 until no scheduled tick remains.
    pub fn export_stream(&self, quantum: u32) -> Vec<TimedMessage> {
        let mut stream = Vec::with_capacity(self.len());
        let Some(last) = self.last_tick() else {
            return stream;
        };
        let step = quantum.max(1);
        let mut from = 0u32;
        loop {
            match from.checked_add(step) {
                Some(to) if to <= last => {
                    stream.extend(self.window(from, to));
                    from = to;
                }
                _ => {
                    stream.extend(self.stamped(from..));
                    break;
                }
            }
        }
        stream
    }
}
