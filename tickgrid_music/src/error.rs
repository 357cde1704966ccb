// Error taxonomy for notation compilation and playback.
//
// Two leaf kinds cover everything the compiler can reject:
// - `FormatError`: the text itself is malformed (grid segment length, cell
//   alphabet, measure shape, unsupported beat distribution).
// - `LookupError`: the text is well-formed but names something that does not
//   exist or resolves out of range (key, mode, degree, instrument, pitch).
//
// `Error` wraps both plus the resource-level failures of reading notation
// from disk and writing export files. An unmatched phrase name or a player
// with no phrases is not an error at all: those produce no notes.
//
// During live reload every variant is caught at the rebuild boundary in
// `scheduler.rs`; during an initial load it propagates to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed notation text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("beat segment '{segment}' has {len} cells, expected 4")]
    SegmentLength { segment: String, len: usize },
    #[error("invalid cell '{cell}' at index {index} in {grid} grid")]
    InvalidCell {
        cell: char,
        index: usize,
        grid: &'static str,
    },
    #[error("sustain at cell {index} does not follow a pitched cell")]
    DanglingSustain { index: usize },
    #[error("measure '{meas}' has {count} beats, expected 4")]
    BeatCount { meas: String, count: usize },
    #[error("measure '{meas}' starts with a blank beat")]
    BlankDownbeat { meas: String },
    #[error("measure '{meas}' splits its beats as {split}, which is not supported")]
    UnsupportedDistribution { meas: String, split: String },
    #[error("unbalanced brackets in '{text}'")]
    UnbalancedBrackets { text: String },
    #[error("pattern '{name}' has no measures")]
    EmptyPattern { name: String },
    #[error("phrase '{name}' has {entries} '{field}' entries for {voices} voices")]
    VoiceMetadata {
        name: String,
        field: &'static str,
        voices: usize,
        entries: usize,
    },
    #[error("phrase '{name}' of type {kind} has no note grid")]
    MissingGrid { name: String, kind: String },
}

/// Well-formed text that names or resolves to something invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("unknown mode '{0}'")]
    UnknownMode(String),
    #[error("unknown degree '{0}'")]
    UnknownDegree(String),
    #[error("scale step {0} is outside 1-7")]
    StepOutOfRange(u8),
    #[error("resolved pitch {0} is outside the MIDI range 0-127")]
    PitchOutOfRange(i32),
    #[error("octave offset {0} is too large")]
    OctaveOutOfRange(i32),
    #[error("unknown phrase type '{0}'")]
    UnknownPhraseType(String),
    #[error("unknown percussion '{0}'")]
    UnknownPercussion(String),
    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),
    #[error("unknown drum kit '{0}'")]
    UnknownDrumKit(String),
    #[error("unknown pan '{0}'")]
    UnknownPan(String),
    #[error("song refers to unknown pattern '{0}'")]
    UnknownPattern(String),
    #[error("MIDI channel {0} is outside 0-15")]
    ChannelOutOfRange(u8),
    #[error("{what} {value} is outside 0-127")]
    ValueOutOfRange { what: &'static str, value: u32 },
}

/// Any failure while loading, compiling, exporting or playing a song.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("cannot read {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("rebuild aborted: {0}")]
    Aborted(String),
    #[error("cannot export while playback is running")]
    Busy,
    #[error("cannot write MIDI file {}: {source}", path.display())]
    Smf {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
