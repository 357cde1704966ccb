// Notation parser: chord-progression patterns and per-voice note grids.
//
// Pattern text is a run of bracketed measures, `[I | | | ][IV | |V:m | ]`.
// Each measure holds exactly four beat tokens separated by `|`. A token is a
// Roman-numeral degree with an optional `:mode` suffix, or blank, meaning
// "the previous chord continues". Runs of blanks fold into the chord before
// them, giving one `Span` per harmonic run. Only five ways of splitting the
// four beats are recognized (4, 3+1, 2+2, 1+3, 1+2+1); anything else is a
// `FormatError`, never a silently shortened span list.
//
// Grid text is the same bracket/bar framing around 4-character beat
// segments at sixteenth-note resolution:
// - pitched voices: `1`-`7` (scale step), `-` (rest), `>` (hold the
//   previous pitched cell one more sixteenth)
// - percussive voices: `x` (hit), `-` (rest)
//
// Framing characters are stripped before cells are read, so the cell index
// of a character is its position in the whole grid, not within its measure.

use std::fmt;

use crate::config::BEATS_PER_MEAS;
use crate::error::{FormatError, Result};
use crate::theory::{Degree, Mode};

/// Splits of a four-beat measure the notation accepts.
const SUPPORTED_SPLITS: [&[u8]; 5] = [&[4], &[3, 1], &[2, 2], &[1, 3], &[1, 2, 1]];

/// Cells per beat segment in a grid.
const SEGMENT_CELLS: usize = 4;

/// A 1-4 beat harmonic region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub beat_count: u8,
    pub degree: Degree,
    /// Overrides the song's mode for this span only.
    pub mode: Option<Mode>,
}

impl Span {
    pub fn new(beat_count: u8, degree: Degree) -> Self {
        Self {
            beat_count,
            degree,
            mode: None,
        }
    }

    pub fn with_mode(beat_count: u8, degree: Degree, mode: Mode) -> Self {
        Self {
            beat_count,
            degree,
            mode: Some(mode),
        }
    }
}

/// One 4/4 measure: spans whose beat counts sum to 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meas {
    spans: Vec<Span>,
}

impl Meas {
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
}

/// A named chord progression of whole measures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub name: String,
    meas: Vec<Meas>,
}

impl Pattern {
    /// Parse pattern text. See the module docs for the grammar.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let meas = split_measures(text)?
            .into_iter()
            .map(parse_meas)
            .collect::<Result<Vec<_>>>()?;
        if meas.is_empty() {
            return Err(FormatError::EmptyPattern {
                name: name.to_string(),
            }
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            meas,
        })
    }

    pub fn meas(&self) -> &[Meas] {
        &self.meas
    }

    /// Total beats: 4 per measure.
    pub fn beat_count(&self) -> u32 {
        self.meas.len() as u32 * BEATS_PER_MEAS
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.meas.iter().flat_map(|m| m.spans.iter())
    }

    /// The span sounding at `beat` (0-based). Beats past the end clamp to
    /// the final span.
    pub fn span_at_beat(&self, beat: u32) -> &Span {
        let mut start = 0u32;
        let mut last = None;
        for span in self.spans() {
            let end = start + u32::from(span.beat_count);
            if beat < end {
                return span;
            }
            start = end;
            last = Some(span);
        }
        // `parse` rejects empty patterns and every measure holds a span.
        last.unwrap_or(&self.meas[0].spans[0])
    }

    pub fn first_span(&self) -> &Span {
        &self.meas[0].spans[0]
    }

    pub fn last_span(&self) -> &Span {
        self.span_at_beat(self.beat_count().saturating_sub(1))
    }
}

/// Split `[..][..]` into measure bodies. Text with no brackets is one measure.
fn split_measures(text: &str) -> Result<Vec<&str>> {
    let unbalanced = || FormatError::UnbalancedBrackets {
        text: text.to_string(),
    };
    if !text.contains(['[', ']']) {
        return Ok(if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text]
        });
    }
    let mut bodies = Vec::new();
    let mut open: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        match (ch, open) {
            ('[', None) => open = Some(i + 1),
            (']', Some(start)) => {
                bodies.push(&text[start..i]);
                open = None;
            }
            ('[', Some(_)) | (']', None) => return Err(unbalanced().into()),
            (c, None) if !c.is_whitespace() => return Err(unbalanced().into()),
            _ => {}
        }
    }
    if open.is_some() {
        return Err(unbalanced().into());
    }
    Ok(bodies)
}

/// Parse one measure body such as `I | |V:m | `.
pub fn parse_meas(body: &str) -> Result<Meas> {
    let mut tokens: Vec<&str> = body.split('|').map(str::trim).collect();
    // A closing bar after the fourth beat is allowed: `I |V | |I |`.
    if tokens.len() == 5 && tokens[4].is_empty() {
        tokens.pop();
    }
    if tokens.len() != BEATS_PER_MEAS as usize {
        return Err(FormatError::BeatCount {
            meas: body.to_string(),
            count: tokens.len(),
        }
        .into());
    }
    if tokens[0].is_empty() {
        return Err(FormatError::BlankDownbeat {
            meas: body.to_string(),
        }
        .into());
    }

    // Fold blank tokens into the run that precedes them.
    let mut runs: Vec<(&str, u8)> = Vec::new();
    for token in tokens {
        if token.is_empty() {
            if let Some(run) = runs.last_mut() {
                run.1 += 1;
                continue;
            }
        }
        runs.push((token, 1));
    }

    let split: Vec<u8> = runs.iter().map(|&(_, len)| len).collect();
    if !SUPPORTED_SPLITS.iter().any(|s| *s == split.as_slice()) {
        let split = split
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join("+");
        return Err(FormatError::UnsupportedDistribution {
            meas: body.to_string(),
            split,
        }
        .into());
    }

    let spans = runs
        .into_iter()
        .map(|(token, len)| parse_span(token, len))
        .collect::<Result<Vec<_>>>()?;
    Ok(Meas { spans })
}

fn parse_span(token: &str, beat_count: u8) -> Result<Span> {
    let span = match token.split_once(':') {
        None => Span::new(beat_count, token.parse()?),
        Some((degree, mode)) => Span::with_mode(beat_count, degree.parse()?, mode.parse()?),
    };
    Ok(span)
}

/// A cell of a pitched grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// Scale step 1-7 above the active span's root.
    Pitched(u8),
    Rest,
    Sustain,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Pitched(step) => write!(f, "{step}"),
            Cell::Rest => f.write_str("-"),
            Cell::Sustain => f.write_str(">"),
        }
    }
}

/// Number of `Sustain` cells directly after `index`, looking no further
/// than `limit` cells into the grid.
pub fn sustain_run(cells: &[Cell], index: usize, limit: usize) -> usize {
    cells
        .iter()
        .take(limit)
        .skip(index + 1)
        .take_while(|c| **c == Cell::Sustain)
        .count()
}

/// Strip framing and check every beat segment holds exactly 4 cells.
fn grid_cells(text: &str) -> Result<Vec<char>> {
    let mut cells = Vec::with_capacity(text.len());
    for segment in text.split(['[', ']', '|']) {
        if segment.trim().is_empty() {
            continue;
        }
        let len = segment.chars().count();
        if len != SEGMENT_CELLS {
            return Err(FormatError::SegmentLength {
                segment: segment.to_string(),
                len,
            }
            .into());
        }
        cells.extend(segment.chars());
    }
    Ok(cells)
}

/// Parse a pitched-voice grid such as `[1>>-|3-3-|5-5-|3-3-]`.
pub fn parse_pitched_grid(text: &str) -> Result<Vec<Cell>> {
    let chars = grid_cells(text)?;
    let mut cells = Vec::with_capacity(chars.len());
    let mut sounding = false;
    for (index, ch) in chars.into_iter().enumerate() {
        let cell = match ch {
            '1'..='7' => {
                sounding = true;
                Cell::Pitched(ch as u8 - b'0')
            }
            '-' => {
                sounding = false;
                Cell::Rest
            }
            '>' if sounding => Cell::Sustain,
            '>' => return Err(FormatError::DanglingSustain { index }.into()),
            _ => {
                return Err(FormatError::InvalidCell {
                    cell: ch,
                    index,
                    grid: "pitched",
                }
                .into());
            }
        };
        cells.push(cell);
    }
    Ok(cells)
}

/// Parse a percussion grid such as `[x-x-|x-x-]`. `true` marks a hit.
pub fn parse_drum_grid(text: &str) -> Result<Vec<bool>> {
    grid_cells(text)?
        .into_iter()
        .enumerate()
        .map(|(index, ch)| match ch {
            'x' => Ok(true),
            '-' => Ok(false),
            _ => Err(FormatError::InvalidCell {
                cell: ch,
                index,
                grid: "drum",
            }
            .into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, LookupError};

    fn format_err<T: fmt::Debug>(result: Result<T>) -> FormatError {
        match result {
            Err(Error::Format(e)) => e,
            other => panic!("expected FormatError, got {other:?}"),
        }
    }

    #[test]
    fn test_whole_measure_span() {
        let meas = parse_meas("I | | | ").unwrap();
        assert_eq!(meas.spans(), &[Span::new(4, Degree::I)]);
    }

    #[test]
    fn test_supported_distributions() {
        let cases: [(&str, &[u8]); 5] = [
            ("I | | | ", &[4]),
            ("I | | |V ", &[3, 1]),
            ("I | |V | ", &[2, 2]),
            ("I |V | | ", &[1, 3]),
            ("I |V | |I |", &[1, 2, 1]),
        ];
        for (text, expected) in cases {
            let meas = parse_meas(text).unwrap();
            let counts: Vec<u8> = meas.spans().iter().map(|s| s.beat_count).collect();
            assert_eq!(counts, expected, "for {text:?}");
            let total: u8 = counts.iter().sum();
            assert_eq!(total, 4);
        }
    }

    #[test]
    fn test_unsupported_distributions_fail() {
        for text in ["I | |V |I ", "I |V |I | ", "I |V |I |V "] {
            assert!(matches!(
                format_err(parse_meas(text)),
                FormatError::UnsupportedDistribution { .. }
            ));
        }
    }

    #[test]
    fn test_wrong_beat_count_fails() {
        assert!(matches!(
            format_err(parse_meas("I | | ")),
            FormatError::BeatCount { count: 3, .. }
        ));
        assert!(matches!(
            format_err(parse_meas(" |I | | ")),
            FormatError::BlankDownbeat { .. }
        ));
    }

    #[test]
    fn test_span_mode_suffix() {
        let meas = parse_meas("IV:m | |V:Lyd | ").unwrap();
        assert_eq!(
            meas.spans(),
            &[
                Span::with_mode(2, Degree::IV, Mode::Mixolydian),
                Span::with_mode(2, Degree::V, Mode::Lydian),
            ]
        );
    }

    #[test]
    fn test_unknown_degree_is_lookup_error() {
        let err = parse_meas("IIX | | | ").unwrap_err();
        assert!(matches!(err, Error::Lookup(LookupError::UnknownDegree(_))));
        let err = parse_meas("I:q | | | ").unwrap_err();
        assert!(matches!(err, Error::Lookup(LookupError::UnknownMode(_))));
    }

    #[test]
    fn test_pattern_measures_and_spans() {
        let p = Pattern::parse("verse", "[I | | | ][IV | |V | ][VI |V | |IV ]").unwrap();
        assert_eq!(p.meas().len(), 3);
        assert_eq!(p.beat_count(), 12);
        assert_eq!(p.span_at_beat(0).degree, Degree::I);
        assert_eq!(p.span_at_beat(3).degree, Degree::I);
        assert_eq!(p.span_at_beat(5).degree, Degree::IV);
        assert_eq!(p.span_at_beat(6).degree, Degree::V);
        assert_eq!(p.span_at_beat(9).degree, Degree::V);
        assert_eq!(p.span_at_beat(11).degree, Degree::IV);
        assert_eq!(p.span_at_beat(40).degree, Degree::IV);
        assert_eq!(p.first_span().degree, Degree::I);
        assert_eq!(p.last_span().degree, Degree::IV);
    }

    #[test]
    fn test_pattern_without_brackets_is_one_measure() {
        let p = Pattern::parse("solo", "II | | | ").unwrap();
        assert_eq!(p.beat_count(), 4);
    }

    #[test]
    fn test_pattern_bracket_errors() {
        assert!(matches!(
            format_err(Pattern::parse("p", "[I | | | ")),
            FormatError::UnbalancedBrackets { .. }
        ));
        assert!(matches!(
            format_err(Pattern::parse("p", "[I | | | ]x[I | | | ]")),
            FormatError::UnbalancedBrackets { .. }
        ));
        assert!(matches!(
            format_err(Pattern::parse("p", "  ")),
            FormatError::EmptyPattern { .. }
        ));
    }

    #[test]
    fn test_pitched_grid_cells() {
        let cells = parse_pitched_grid("1-1-|3-3-|5-5-|3-3-").unwrap();
        assert_eq!(cells.len(), 16);
        let pitched: Vec<usize> = cells
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Cell::Pitched(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(pitched, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_sustain_run_counts_holds() {
        let cells = parse_pitched_grid("1>>-").unwrap();
        assert_eq!(sustain_run(&cells, 0, cells.len()), 2);
        // Limited by the pattern length.
        assert_eq!(sustain_run(&cells, 0, 2), 1);
        // Holds continue across beat boundaries.
        let cells = parse_pitched_grid("[1>>>|>>5-]").unwrap();
        assert_eq!(sustain_run(&cells, 0, cells.len()), 5);
    }

    #[test]
    fn test_segment_length_must_be_four() {
        assert!(matches!(
            format_err(parse_pitched_grid("1-1-|3-3|5-5-|3-3-")),
            FormatError::SegmentLength { len: 3, .. }
        ));
        assert!(matches!(
            format_err(parse_drum_grid("[x-x-x|x-x-]")),
            FormatError::SegmentLength { len: 5, .. }
        ));
    }

    #[test]
    fn test_dangling_sustain_fails() {
        assert!(matches!(
            format_err(parse_pitched_grid(">1--")),
            FormatError::DanglingSustain { index: 0 }
        ));
        assert!(matches!(
            format_err(parse_pitched_grid("1->-")),
            FormatError::DanglingSustain { index: 2 }
        ));
    }

    #[test]
    fn test_cell_alphabets() {
        assert!(matches!(
            format_err(parse_pitched_grid("1-8-")),
            FormatError::InvalidCell { cell: '8', .. }
        ));
        assert!(matches!(
            format_err(parse_drum_grid("x->-")),
            FormatError::InvalidCell { cell: '>', .. }
        ));
        assert_eq!(
            parse_drum_grid("[x---|--x-]").unwrap(),
            vec![true, false, false, false, false, false, true, false]
        );
    }
}
