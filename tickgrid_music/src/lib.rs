// Tickgrid: a chord-grid and rhythm-grid notation compiler for MIDI.
//
// Songs are written as JSON documents holding short grid strings. Patterns
// lay out harmony (`[I | |V:m | ]`: one measure, 4 beats, spans of scale
// degrees with optional mode overrides); phrases lay out rhythm and melody
// against a pattern (`1>>-|3-3-|...`: scale steps, rests, holds, four cells
// per beat). Compilation resolves every cell to a pitch and produces a
// tick-indexed table of channel messages that is played live or exported.
//
// Architecture:
// - config.rs: EngineConfig and the Resolution every tick is derived from
// - error.rs: FormatError / LookupError taxonomy and the crate Error
// - theory.rs: keys, modes, degrees and scale-step pitch resolution
// - notation.rs: pattern (measure/span) and cell-grid parsing
// - gm.rs: General MIDI instrument, drum-kit and percussion names
// - song.rs: pattern instances on the absolute tick timeline
// - phrase.rs: the drum / pad / bass / seque generation strategies
// - player.rs: phrases bound to a channel and program, note-on/off pairs
// - mixer.rs: per-type volume and pan faders
// - message.rs: the channel messages everything downstream consumes
// - table.rs: tick-indexed message table, playback windows, export stream
// - source.rs: on-disk JSON records and their compilation
// - scheduler.rs: last-valid table with background live rebuilds
// - transport.rs: playback cursor, output sink, stop and export
// - smf.rs: Standard MIDI File writer for exported streams
//
// Given the same source, config and seed, compilation is deterministic.

pub mod config;
pub mod error;
pub mod gm;
pub mod message;
pub mod mixer;
pub mod notation;
pub mod phrase;
pub mod player;
pub mod scheduler;
pub mod smf;
pub mod song;
pub mod source;
pub mod table;
pub mod theory;
pub mod transport;
