// Engine configuration and tick resolution.
//
// `EngineConfig` holds every tunable the compiler and transport read: tick
// resolution, tempo, note velocity, the seque seed, and the controller used
// for all-notes-off. It loads from JSON with every field defaulted, so an
// empty object `{}` is a valid config.
//
// `Resolution` is the one place tick arithmetic is derived from. A quarter
// note is `ticks_per_quarter` ticks (480 by default); a grid cell is a
// sixteenth (tpq / 4 = 120); the transport delivers in quanta of a 64th
// (tpq / 16 = 30), so one cell spans four delivery quanta.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Grid cells per beat (sixteenth-note resolution).
pub const CELLS_PER_BEAT: u32 = 4;

/// Beats per measure. Every measure is 4/4.
pub const BEATS_PER_MEAS: u32 = 4;

/// Delivery quanta per grid cell.
pub const QUANTA_PER_CELL: u32 = 4;

/// Tick resolution derived from a single ticks-per-quarter base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    ticks_per_quarter: u32,
}

impl Resolution {
    /// Build a resolution. The base must split evenly into delivery quanta.
    pub fn new(ticks_per_quarter: u32) -> Result<Self> {
        let divisor = CELLS_PER_BEAT * QUANTA_PER_CELL;
        if ticks_per_quarter == 0 || ticks_per_quarter % divisor != 0 {
            return Err(Error::Config(format!(
                "ticks_per_quarter {ticks_per_quarter} must be a positive multiple of {divisor}"
            )));
        }
        if ticks_per_quarter > u32::from(u16::MAX >> 1) {
            return Err(Error::Config(format!(
                "ticks_per_quarter {ticks_per_quarter} does not fit a MIDI header"
            )));
        }
        Ok(Self { ticks_per_quarter })
    }

    pub fn ticks_per_quarter(self) -> u32 {
        self.ticks_per_quarter
    }

    /// Length of one grid cell.
    pub fn sixteenth(self) -> u32 {
        self.ticks_per_quarter / CELLS_PER_BEAT
    }

    /// Length of one transport delivery step.
    pub fn quantum(self) -> u32 {
        self.sixteenth() / QUANTA_PER_CELL
    }

    /// Ticks spanned by `beats` quarter-note beats.
    pub fn beats(self, beats: u32) -> u32 {
        beats * self.ticks_per_quarter
    }

    /// Start tick of the 0-based measure `measure`, saturating at the end
    /// of the tick range.
    pub fn measures(self, measure: u32) -> u32 {
        measure
            .saturating_mul(BEATS_PER_MEAS)
            .saturating_mul(self.ticks_per_quarter)
    }

    /// Ticks spanned by `cells` grid cells.
    pub fn cells(self, cells: u32) -> u32 {
        cells * self.sixteenth()
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            ticks_per_quarter: 480,
        }
    }
}

/// Tunables for compilation and playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ticks_per_quarter: u32,
    /// Used when the song itself does not name a tempo.
    pub tempo_bpm: u16,
    /// Velocity of every generated note.
    pub velocity: u8,
    /// Seed for generative phrases. `None` lets the caller pick one.
    pub seque_seed: Option<u64>,
    /// Controller sent on every channel when playback stops.
    pub all_notes_off_controller: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter: 480,
            tempo_bpm: 120,
            velocity: 127,
            seque_seed: None,
            all_notes_off_controller: 123,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Resource {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.resolution()?;
        if self.velocity > 127 {
            return Err(Error::Config(format!(
                "velocity {} is outside 0-127",
                self.velocity
            )));
        }
        if self.all_notes_off_controller > 127 {
            return Err(Error::Config(format!(
                "controller {} is outside 0-127",
                self.all_notes_off_controller
            )));
        }
        if self.tempo_bpm == 0 {
            return Err(Error::Config("tempo_bpm must be positive".into()));
        }
        Ok(())
    }

    pub fn resolution(&self) -> Result<Resolution> {
        Resolution::new(self.ticks_per_quarter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolution_constants() {
        let res = Resolution::default();
        assert_eq!(res.ticks_per_quarter(), 480);
        assert_eq!(res.sixteenth(), 120);
        assert_eq!(res.quantum(), 30);
        assert_eq!(res.beats(16), 7680);
        assert_eq!(res.measures(3), 5760);
        assert_eq!(res.measures(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_resolution_derives_from_base() {
        let res = Resolution::new(960).unwrap();
        assert_eq!(res.sixteenth(), 240);
        assert_eq!(res.quantum(), 60);
    }

    #[test]
    fn test_resolution_rejects_uneven_base() {
        assert!(Resolution::new(100).is_err());
        assert!(Resolution::new(0).is_err());
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = EngineConfig::from_json(r#"{"tempo_bpm": 90, "seque_seed": 7}"#).unwrap();
        assert_eq!(config.tempo_bpm, 90);
        assert_eq!(config.seque_seed, Some(7));
        assert_eq!(config.velocity, 127);
    }

    #[test]
    fn test_validate_rejects_loud_velocity() {
        let config = EngineConfig {
            velocity: 200,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
