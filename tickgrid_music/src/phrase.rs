// Phrase generation: turning a pattern occurrence into timed notes.
//
// A phrase is bound to a pattern by name and fires only for instances of
// that pattern; any other instance is a silent no-op. Each firing appends
// to the phrase's running note list, so callers invoke `generate` once per
// matching instance in timeline order.
//
// Strategies (a closed set, one per phrase type):
// - Drum: every `x` cell of every voice becomes a fixed-length hit on that
//   voice's percussion key.
// - Bass / Pad: monophonic pitched grids. A cell's span is found by beat
//   (cell / 4); its scale step is resolved against that span (auto mode
//   unless the span overrides the mode), shifted by the voice's octave
//   interval (bass: two octaves down), and held for one sixteenth plus one
//   per trailing `>`.
// - Seque: ignores authored grids. Every sixteenth of the pattern gets a
//   short note on a random scale step of the active span.
//
// Pitched voices may carry `pre` and `post` grids. A pre grid is a pickup
// that ends exactly where the pattern starts and resolves against the first
// span; a post grid starts where the pattern ends and resolves against the
// last span. Pickup notes that would land before tick 0 are dropped.

use std::fmt;
use std::str::FromStr;

use tickgrid_prng::NoteRng;
use tracing::debug;

use crate::config::{CELLS_PER_BEAT, Resolution};
use crate::error::{LookupError, Result};
use crate::notation::{Cell, Pattern, Span, sustain_run};
use crate::song::Tonality;
use crate::theory::{checked_pitch, resolve_auto, resolve_span_mode};

/// Semitone offset applied to every bass note.
pub const BASS_INTERVAL: i32 = -24;

/// A timed note. `tick` is absolute from song start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub tick: u32,
    pub pitch: u8,
    pub gate: u32,
    pub velocity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhraseType {
    Drum,
    Pad,
    Bass,
    Seque,
}

impl PhraseType {
    pub fn as_str(self) -> &'static str {
        match self {
            PhraseType::Drum => "drum",
            PhraseType::Pad => "pad",
            PhraseType::Bass => "bass",
            PhraseType::Seque => "seque",
        }
    }
}

impl FromStr for PhraseType {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drum" => Ok(PhraseType::Drum),
            "pad" => Ok(PhraseType::Pad),
            "bass" => Ok(PhraseType::Bass),
            "seque" => Ok(PhraseType::Seque),
            _ => Err(LookupError::UnknownPhraseType(s.to_string())),
        }
    }
}

impl fmt::Display for PhraseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One percussion line of a drum phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumVoice {
    /// Note number on the drum channel.
    pub percussion: u8,
    pub cells: Vec<bool>,
}

/// One monophonic line of a bass or pad phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitchedVoice {
    pub cells: Vec<Cell>,
    /// Semitones added after resolution.
    pub interval: i32,
    pub pre: Vec<Cell>,
    pub post: Vec<Cell>,
}

impl PitchedVoice {
    pub fn new(cells: Vec<Cell>, interval: i32) -> Self {
        Self {
            cells,
            interval,
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    pub fn with_pre(mut self, pre: Vec<Cell>) -> Self {
        self.pre = pre;
        self
    }

    pub fn with_post(mut self, post: Vec<Cell>) -> Self {
        self.post = post;
        self
    }
}

/// How a phrase turns a pattern occurrence into notes.
#[derive(Debug, Clone)]
pub enum Strategy {
    Drum(Vec<DrumVoice>),
    Pad(Vec<PitchedVoice>),
    Bass(PitchedVoice),
    Seque(NoteRng),
}

impl Strategy {
    pub fn phrase_type(&self) -> PhraseType {
        match self {
            Strategy::Drum(_) => PhraseType::Drum,
            Strategy::Pad(_) => PhraseType::Pad,
            Strategy::Bass(_) => PhraseType::Bass,
            Strategy::Seque(_) => PhraseType::Seque,
        }
    }
}

/// Everything a strategy needs to place notes for one pattern instance.
struct Placement<'a> {
    position: u32,
    tonality: Tonality,
    pattern: &'a Pattern,
    resolution: Resolution,
    velocity: u8,
}

impl Placement<'_> {
    fn cell_count(&self) -> usize {
        (self.pattern.beat_count() * CELLS_PER_BEAT) as usize
    }

    fn cell_tick(&self, origin: i64, index: usize) -> Option<u32> {
        let tick = origin + i64::from(self.resolution.sixteenth()) * index as i64;
        u32::try_from(tick).ok()
    }

    fn span_for_cell(&self, index: usize) -> Span {
        *self.pattern.span_at_beat(index as u32 / CELLS_PER_BEAT)
    }
}

#[derive(Debug, Clone)]
pub struct Phrase {
    name: String,
    strategy: Strategy,
    resolution: Resolution,
    velocity: u8,
    notes: Vec<Note>,
}

impl Phrase {
    pub fn new(name: &str, strategy: Strategy, resolution: Resolution, velocity: u8) -> Self {
        Self {
            name: name.to_string(),
            strategy,
            resolution,
            velocity,
            notes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phrase_type(&self) -> PhraseType {
        self.strategy.phrase_type()
    }

    /// Every note generated so far.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Generate notes for one occurrence of `pattern` starting at `position`.
    ///
    /// Returns the notes added by this call, ordered by tick. A pattern
    /// whose name differs from the phrase's adds nothing. On error nothing
    /// from this call is kept.
    pub fn generate(
        &mut self,
        position: u32,
        tonality: Tonality,
        pattern: &Pattern,
    ) -> Result<&[Note]> {
        if self.name != pattern.name {
            return Ok(&[]);
        }
        let at = Placement {
            position,
            tonality,
            pattern,
            resolution: self.resolution,
            velocity: self.velocity,
        };
        let before = self.notes.len();
        let result = match &mut self.strategy {
            Strategy::Drum(voices) => {
                for voice in voices.iter() {
                    drum_notes(&at, voice, &mut self.notes);
                }
                Ok(())
            }
            Strategy::Pad(voices) => voices
                .iter()
                .try_for_each(|voice| pitched_notes(&at, voice, &mut self.notes)),
            Strategy::Bass(voice) => pitched_notes(&at, voice, &mut self.notes),
            Strategy::Seque(rng) => seque_notes(&at, rng, &mut self.notes),
        };
        if let Err(e) = result {
            self.notes.truncate(before);
            return Err(e);
        }
        self.notes[before..].sort_by_key(|n| n.tick);
        debug!(
            phrase = %self.name,
            kind = %self.strategy.phrase_type(),
            position,
            notes = self.notes.len() - before,
            "generated phrase"
        );
        Ok(&self.notes[before..])
    }
}

/// Resolve `step` within `span`, honoring a span-local mode override.
fn resolve(tonality: Tonality, span: &Span, step: u8) -> Result<i32, LookupError> {
    match span.mode {
        Some(mode) if mode != tonality.mode => {
            resolve_span_mode(tonality.key, span.degree, tonality.mode, mode, step)
        }
        _ => resolve_auto(tonality.key, span.degree, tonality.mode, step),
    }
}

fn drum_notes(at: &Placement<'_>, voice: &DrumVoice, out: &mut Vec<Note>) {
    let origin = i64::from(at.position);
    for (index, _) in voice
        .cells
        .iter()
        .enumerate()
        .take(at.cell_count())
        .filter(|&(_, hit)| *hit)
    {
        if let Some(tick) = at.cell_tick(origin, index) {
            out.push(Note {
                tick,
                pitch: voice.percussion,
                gate: at.resolution.sixteenth(),
                velocity: at.velocity,
            });
        }
    }
}

/// Place the pitched cells of one grid. `span_for` maps a cell index to
/// the span it resolves against.
fn place_pitched(
    at: &Placement<'_>,
    cells: &[Cell],
    origin: i64,
    limit: usize,
    interval: i32,
    span_for: &dyn Fn(usize) -> Span,
    out: &mut Vec<Note>,
) -> Result<()> {
    for (index, cell) in cells.iter().enumerate().take(limit) {
        let Cell::Pitched(step) = *cell else {
            continue;
        };
        let Some(tick) = at.cell_tick(origin, index) else {
            continue;
        };
        let span = span_for(index);
        let root = resolve(at.tonality, &span, step)?;
        let pitch = root
            .checked_add(interval)
            .ok_or(LookupError::PitchOutOfRange(root))
            .and_then(checked_pitch)?;
        let holds = sustain_run(cells, index, limit) as u32;
        out.push(Note {
            tick,
            pitch,
            gate: at.resolution.cells(holds + 1),
            velocity: at.velocity,
        });
    }
    Ok(())
}

fn pitched_notes(at: &Placement<'_>, voice: &PitchedVoice, out: &mut Vec<Note>) -> Result<()> {
    let sixteenth = i64::from(at.resolution.sixteenth());
    let start = i64::from(at.position);
    let cells = at.cell_count();

    if !voice.pre.is_empty() {
        let first = *at.pattern.first_span();
        let origin = start - sixteenth * voice.pre.len() as i64;
        place_pitched(
            at,
            &voice.pre,
            origin,
            voice.pre.len(),
            voice.interval,
            &|_| first,
            out,
        )?;
    }

    place_pitched(
        at,
        &voice.cells,
        start,
        cells,
        voice.interval,
        &|index| at.span_for_cell(index),
        out,
    )?;

    if !voice.post.is_empty() {
        let last = *at.pattern.last_span();
        let origin = start + sixteenth * cells as i64;
        place_pitched(
            at,
            &voice.post,
            origin,
            voice.post.len(),
            voice.interval,
            &|_| last,
            out,
        )?;
    }
    Ok(())
}

fn seque_notes(at: &Placement<'_>, rng: &mut NoteRng, out: &mut Vec<Note>) -> Result<()> {
    let origin = i64::from(at.position);
    for index in 0..at.cell_count() {
        let Some(tick) = at.cell_tick(origin, index) else {
            continue;
        };
        let span = at.span_for_cell(index);
        let pitch = checked_pitch(resolve(at.tonality, &span, rng.scale_step())?)?;
        out.push(Note {
            tick,
            pitch,
            gate: at.resolution.quantum(),
            velocity: at.velocity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::notation::{parse_drum_grid, parse_pitched_grid};
    use crate::theory::{Degree, Key, Mode};

    fn res() -> Resolution {
        Resolution::default()
    }

    fn c_major() -> Tonality {
        Tonality::new(Key::C, Mode::Ionian)
    }

    fn bass(name: &str, grid: &str) -> Phrase {
        let voice = PitchedVoice::new(parse_pitched_grid(grid).unwrap(), BASS_INTERVAL);
        Phrase::new(name, Strategy::Bass(voice), res(), 127)
    }

    #[test]
    fn test_bass_cells_and_gates() {
        let pattern = Pattern::parse("a", "[I | | | ]").unwrap();
        let mut phrase = bass("a", "1-1-|3-3-|5-5-|3-3-");
        let notes = phrase.generate(0, c_major(), &pattern).unwrap();
        let ticks: Vec<u32> = notes.iter().map(|n| n.tick).collect();
        assert_eq!(ticks, vec![0, 240, 480, 720, 960, 1200, 1440, 1680]);
        assert!(notes.iter().all(|n| n.gate == 120));
        // C major triad, two octaves down.
        assert_eq!(notes[0].pitch, 36);
        assert_eq!(notes[2].pitch, 40);
        assert_eq!(notes[4].pitch, 43);
    }

    #[test]
    fn test_sustain_extends_gate() {
        let pattern = Pattern::parse("a", "[I | | | ]").unwrap();
        let mut phrase = bass("a", "1>>-|----|----|----");
        let notes = phrase.generate(0, c_major(), &pattern).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].gate, 360);
    }

    #[test]
    fn test_four_measure_bass_matches_resolver() {
        let pattern =
            Pattern::parse("verse", "[I | | | ][IV | | | ][VII | | | ][I | |V | ]").unwrap();
        assert_eq!(pattern.beat_count(), 16);
        let grid = "[1-1-|3-3-|5-5-|3-3-][1-11|3-33|5-55|3-33][1>--|5>--|1>--|5>--][1---|1---|1---|1---]";
        let cells = parse_pitched_grid(grid).unwrap();
        let non_rest = cells.iter().filter(|c| matches!(c, Cell::Pitched(_))).count();
        let tonality = Tonality::new(Key::A, Mode::Dorian);
        let mut phrase = bass("verse", grid);
        let notes = phrase.generate(3840, tonality, &pattern).unwrap().to_vec();
        assert_eq!(notes.len(), non_rest);
        for note in &notes {
            let index = ((note.tick - 3840) / 120) as usize;
            let Cell::Pitched(step) = cells[index] else {
                panic!("note on a non-pitched cell");
            };
            let span = pattern.span_at_beat(index as u32 / 4);
            let expected = resolve_auto(Key::A, span.degree, Mode::Dorian, step).unwrap();
            assert_eq!(i32::from(note.pitch), expected - 24);
        }
    }

    #[test]
    fn test_name_mismatch_is_silent() {
        let pattern = Pattern::parse("chorus", "[I | | | ]").unwrap();
        let mut phrase = bass("verse", "1---|----|----|----");
        assert!(phrase.generate(0, c_major(), &pattern).unwrap().is_empty());
        assert!(phrase.notes().is_empty());
    }

    #[test]
    fn test_notes_accumulate_across_instances() {
        let pattern = Pattern::parse("a", "[I | | | ]").unwrap();
        let mut phrase = bass("a", "1---|----|----|----");
        phrase.generate(0, c_major(), &pattern).unwrap();
        phrase.generate(1920, c_major(), &pattern).unwrap();
        let ticks: Vec<u32> = phrase.notes().iter().map(|n| n.tick).collect();
        assert_eq!(ticks, vec![0, 1920]);
    }

    #[test]
    fn test_span_mode_override_changes_pitch() {
        let plain = Pattern::parse("a", "[II | | | ]").unwrap();
        let borrowed = Pattern::parse("a", "[II:m | | | ]").unwrap();
        let same = Pattern::parse("a", "[II:i | | | ]").unwrap();
        let third = |pattern: &Pattern| {
            let mut phrase = bass("a", "3---|----|----|----");
            phrase.generate(0, c_major(), pattern).unwrap()[0].pitch
        };
        // D Dorian third is F (65), Mixolydian gives F# (66).
        assert_eq!(third(&plain), 65 - 24);
        assert_eq!(third(&borrowed), 66 - 24);
        // An override equal to the song mode resolves automatically.
        assert_eq!(third(&same), 65 - 24);
    }

    #[test]
    fn test_drum_hits() {
        let pattern = Pattern::parse("beat", "[I | | | ]").unwrap();
        let voices = vec![
            DrumVoice {
                percussion: 36,
                cells: parse_drum_grid("x---|x---|x---|x---").unwrap(),
            },
            DrumVoice {
                percussion: 38,
                cells: parse_drum_grid("----|x---|----|x---").unwrap(),
            },
        ];
        let mut phrase = Phrase::new("beat", Strategy::Drum(voices), res(), 100);
        let notes = phrase.generate(1920, c_major(), &pattern).unwrap();
        assert_eq!(notes.len(), 6);
        assert!(notes.iter().all(|n| n.gate == 120 && n.velocity == 100));
        assert!(notes.windows(2).all(|w| w[0].tick <= w[1].tick));
        let snares: Vec<u32> = notes.iter().filter(|n| n.pitch == 38).map(|n| n.tick).collect();
        assert_eq!(snares, vec![2400, 3360]);
    }

    #[test]
    fn test_cells_past_pattern_end_are_ignored() {
        let pattern = Pattern::parse("a", "[I | | | ]").unwrap();
        let mut phrase = bass("a", "[1---|----|----|----][1---|----|----|----]");
        assert_eq!(phrase.generate(0, c_major(), &pattern).unwrap().len(), 1);
        // A hold is cut at the pattern boundary.
        let mut phrase = bass("a", "[----|----|----|---1][>>>-|----|----|----]");
        let notes = phrase.generate(0, c_major(), &pattern).unwrap();
        assert_eq!(notes[0].gate, 120);
    }

    #[test]
    fn test_pad_voices_use_octave_interval() {
        let pattern = Pattern::parse("p", "[I | | | ]").unwrap();
        let voices = vec![
            PitchedVoice::new(parse_pitched_grid("1>>>|>>>>|>>>>|>>>>").unwrap(), 0),
            PitchedVoice::new(parse_pitched_grid("3>>>|>>>>|>>>>|>>>>").unwrap(), 12),
        ];
        let mut phrase = Phrase::new("p", Strategy::Pad(voices), res(), 127);
        let notes = phrase.generate(0, c_major(), &pattern).unwrap();
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 76]);
        assert!(notes.iter().all(|n| n.gate == 1920));
    }

    #[test]
    fn test_pitch_out_of_range_fails_cleanly() {
        let pattern = Pattern::parse("p", "[I | | | ]").unwrap();
        let voices = vec![
            PitchedVoice::new(parse_pitched_grid("1---|----|----|----").unwrap(), 0),
            PitchedVoice::new(parse_pitched_grid("1---|----|----|----").unwrap(), 84),
        ];
        let mut phrase = Phrase::new("p", Strategy::Pad(voices), res(), 127);
        let err = phrase.generate(0, c_major(), &pattern).unwrap_err();
        assert!(matches!(
            err,
            Error::Lookup(LookupError::PitchOutOfRange(144))
        ));
        assert!(phrase.notes().is_empty());
    }

    #[test]
    fn test_interval_overflow_is_out_of_range() {
        let pattern = Pattern::parse("p", "[I | | | ]").unwrap();
        let voice = PitchedVoice::new(parse_pitched_grid("1---|----|----|----").unwrap(), i32::MAX);
        let mut phrase = Phrase::new("p", Strategy::Bass(voice), res(), 127);
        let err = phrase.generate(0, c_major(), &pattern).unwrap_err();
        assert!(matches!(
            err,
            Error::Lookup(LookupError::PitchOutOfRange(60))
        ));
    }

    #[test]
    fn test_pre_and_post_grids() {
        let pattern = Pattern::parse("a", "[IV | | |V ]").unwrap();
        let voice = PitchedVoice::new(parse_pitched_grid("1---|----|----|----").unwrap(), 0)
            .with_pre(parse_pitched_grid("--1>").unwrap())
            .with_post(parse_pitched_grid("1---").unwrap());
        let mut phrase = Phrase::new("a", Strategy::Bass(voice), res(), 127);

        // At tick 0 the pickup would start before the song and is dropped.
        let notes = phrase.generate(0, c_major(), &pattern).unwrap().to_vec();
        assert_eq!(notes.len(), 2);

        let notes = phrase.generate(1920, c_major(), &pattern).unwrap().to_vec();
        assert_eq!(
            notes,
            vec![
                // Pickup on the first span (IV = F), held into the downbeat.
                Note { tick: 1920 - 240, pitch: 65, gate: 240, velocity: 127 },
                Note { tick: 1920, pitch: 65, gate: 120, velocity: 127 },
                // Tail on the last span (V = G).
                Note { tick: 3840, pitch: 67, gate: 120, velocity: 127 },
            ]
        );
    }

    #[test]
    fn test_seque_fills_every_sixteenth() {
        let pattern = Pattern::parse("s", "[I | | | ][V | | | ]").unwrap();
        let mut phrase = Phrase::new("s", Strategy::Seque(NoteRng::new(9)), res(), 127);
        let notes = phrase.generate(0, c_major(), &pattern).unwrap().to_vec();
        assert_eq!(notes.len(), 32);
        for (i, note) in notes.iter().enumerate() {
            assert_eq!(note.tick, i as u32 * 120);
            assert_eq!(note.gate, 30);
            let span = pattern.span_at_beat(i as u32 / 4);
            let candidates: Vec<i32> = (1..=7)
                .map(|step| resolve_auto(Key::C, span.degree, Mode::Ionian, step).unwrap())
                .collect();
            assert!(candidates.contains(&i32::from(note.pitch)));
        }
        assert_eq!(pattern.span_at_beat(4).degree, Degree::V);
    }

    #[test]
    fn test_seque_repeats_for_same_seed() {
        let pattern = Pattern::parse("s", "[I | | | ]").unwrap();
        let run = |seed| {
            let mut phrase = Phrase::new("s", Strategy::Seque(NoteRng::new(seed)), res(), 127);
            phrase.generate(0, c_major(), &pattern).unwrap().to_vec()
        };
        assert_eq!(run(4), run(4));
        assert_ne!(run(4), run(5));
    }

    #[test]
    fn test_phrase_type_names() {
        assert_eq!("Drum".parse::<PhraseType>().unwrap(), PhraseType::Drum);
        assert_eq!(PhraseType::Seque.to_string(), "seque");
        assert!("lead".parse::<PhraseType>().is_err());
    }
}
