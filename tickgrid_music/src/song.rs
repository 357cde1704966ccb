// Song assembly: pattern instances laid out on an absolute tick timeline.
//
// A song is a key, a mode, and an ordered list of pattern names. The same
// pattern may appear many times; each appearance is a `PatternInstance`
// whose start tick is the sum of the lengths of every instance before it
// (4 cells per beat, one sixteenth per cell). Every tick downstream of here
// is absolute from song start.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Resolution;
use crate::error::{LookupError, Result};
use crate::notation::Pattern;
use crate::theory::{Key, Mode};

/// The song-wide key and mode every span inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tonality {
    pub key: Key,
    pub mode: Mode,
}

impl Tonality {
    pub fn new(key: Key, mode: Mode) -> Self {
        Self { key, mode }
    }
}

/// One occurrence of a pattern in the song.
#[derive(Debug, Clone)]
pub struct PatternInstance {
    pub pattern: Arc<Pattern>,
    /// Absolute start tick.
    pub start: u32,
}

#[derive(Debug, Clone)]
pub struct Song {
    pub tonality: Tonality,
    resolution: Resolution,
    instances: Vec<PatternInstance>,
    end: u32,
}

impl Song {
    pub fn new(tonality: Tonality, resolution: Resolution) -> Self {
        Self {
            tonality,
            resolution,
            instances: Vec::new(),
            end: 0,
        }
    }

    /// Lay out `names` in order, looking each up in `patterns`.
    pub fn arrange(
        tonality: Tonality,
        resolution: Resolution,
        patterns: &BTreeMap<String, Arc<Pattern>>,
        names: &[String],
    ) -> Result<Self> {
        let mut song = Self::new(tonality, resolution);
        for name in names {
            let pattern = patterns
                .get(name)
                .ok_or_else(|| LookupError::UnknownPattern(name.clone()))?;
            song.push(Arc::clone(pattern));
        }
        Ok(song)
    }

    /// Append a pattern instance at the current end of the song.
    pub fn push(&mut self, pattern: Arc<Pattern>) {
        let start = self.end;
        self.end += self.resolution.beats(pattern.beat_count());
        self.instances.push(PatternInstance { pattern, start });
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn instances(&self) -> &[PatternInstance] {
        &self.instances
    }

    /// Instances starting at or after `tick`, in timeline order.
    pub fn instances_from(&self, tick: u32) -> impl Iterator<Item = &PatternInstance> {
        self.instances.iter().filter(move |inst| inst.start >= tick)
    }

    /// Tick just past the last instance.
    pub fn length_ticks(&self) -> u32 {
        self.end
    }
}
