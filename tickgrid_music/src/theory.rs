// Music theory: keys, church modes, scale degrees, and pitch resolution.
//
// A song has a key (one of 12 pitch classes) and a mode (one of the seven
// church modes). Chord roots in the notation are scale degrees I-VII of that
// key+mode, and grid cells name a scale step 1-7 counted from the chord root.
//
// Two resolution paths:
// - `resolve_auto`: the chord borrows the song's own scale. Step `n` above
//   degree `d` is scale index `d + n - 2` of the key's mode, wrapping into
//   higher octaves. On degree II of C Ionian this walks D Dorian, on V it
//   walks G Mixolydian, without anyone naming those modes.
// - `resolve_span_mode`: a span overrides the mode for itself alone. The root
//   still comes from the song's key+mode; the steps above it follow the
//   span's mode (modal interchange).
//
// Results are MIDI-style pitch numbers around middle C (key root = 60 + pc).
// Nothing here clamps; callers add octave offsets and then run
// `checked_pitch`, which fails rather than wrapping or saturating.

use std::fmt;
use std::str::FromStr;

use crate::error::LookupError;

/// Pitch of the key root in the reference octave (C4 = 60).
const REFERENCE_C: i32 = 60;

/// One of the 12 pitch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    C,
    Db,
    D,
    Eb,
    E,
    F,
    Gb,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::C,
        Key::Db,
        Key::D,
        Key::Eb,
        Key::E,
        Key::F,
        Key::Gb,
        Key::G,
        Key::Ab,
        Key::A,
        Key::Bb,
        Key::B,
    ];

    /// Pitch class, 0 = C.
    pub fn pitch_class(self) -> u8 {
        self as u8
    }

    /// Root pitch in the reference octave.
    pub fn root(self) -> i32 {
        REFERENCE_C + i32::from(self.pitch_class())
    }
}

impl FromStr for Key {
    type Err = LookupError;

    /// Accepts flats and sharps: `Eb`, `D#`, `Dsharp` all name pitch class 3.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .ok_or_else(|| LookupError::UnknownKey(s.to_string()))?;
        let natural: u8 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(LookupError::UnknownKey(s.to_string())),
        };
        let accidental: i8 = match chars.as_str().to_ascii_lowercase().as_str() {
            "" => 0,
            "b" | "flat" => -1,
            "#" | "s" | "sharp" => 1,
            _ => return Err(LookupError::UnknownKey(s.to_string())),
        };
        let pc = (i16::from(natural) + i16::from(accidental)).rem_euclid(12) as usize;
        Ok(Key::ALL[pc])
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::C => "C",
            Key::Db => "Db",
            Key::D => "D",
            Key::Eb => "Eb",
            Key::E => "E",
            Key::F => "F",
            Key::Gb => "Gb",
            Key::G => "G",
            Key::Ab => "Ab",
            Key::A => "A",
            Key::Bb => "Bb",
            Key::B => "B",
        };
        f.write_str(name)
    }
}

/// The seven church modes, each a rotation of the major scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// C D E F G A B (major)
    Ionian,
    /// D E F G A B C (minor with raised 6th)
    Dorian,
    /// E F G A B C D (half step from 1 to 2)
    Phrygian,
    /// F G A B C D E (raised 4th)
    Lydian,
    /// G A B C D E F (major with lowered 7th)
    Mixolydian,
    /// A B C D E F G (natural minor)
    Aeolian,
    /// B C D E F G A (diminished 5th)
    Locrian,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Ionian,
        Mode::Dorian,
        Mode::Phrygian,
        Mode::Lydian,
        Mode::Mixolydian,
        Mode::Aeolian,
        Mode::Locrian,
    ];

    /// Semitones from the final to each of the 7 scale degrees.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            Mode::Ionian => [0, 2, 4, 5, 7, 9, 11],
            Mode::Dorian => [0, 2, 3, 5, 7, 9, 10],
            Mode::Phrygian => [0, 1, 3, 5, 7, 8, 10],
            Mode::Lydian => [0, 2, 4, 6, 7, 9, 11],
            Mode::Mixolydian => [0, 2, 4, 5, 7, 9, 10],
            Mode::Aeolian => [0, 2, 3, 5, 7, 8, 10],
            Mode::Locrian => [0, 1, 3, 5, 6, 8, 10],
        }
    }

    /// Three-letter name used in notation (`Dor`, `Mix`, ...).
    pub fn abbreviation(self) -> &'static str {
        match self {
            Mode::Ionian => "Ion",
            Mode::Dorian => "Dor",
            Mode::Phrygian => "Phr",
            Mode::Lydian => "Lyd",
            Mode::Mixolydian => "Mix",
            Mode::Aeolian => "Aeo",
            Mode::Locrian => "Loc",
        }
    }
}

impl FromStr for Mode {
    type Err = LookupError;

    /// Accepts the one-letter span suffixes (`i d p l m a o`), the
    /// three-letter abbreviations, and full names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let mode = match lower.as_str() {
            "i" | "ion" | "ionian" | "major" => Mode::Ionian,
            "d" | "dor" | "dorian" => Mode::Dorian,
            "p" | "phr" | "phrygian" => Mode::Phrygian,
            "l" | "lyd" | "lydian" => Mode::Lydian,
            "m" | "mix" | "mixolydian" => Mode::Mixolydian,
            "a" | "aeo" | "aeolian" | "minor" => Mode::Aeolian,
            "o" | "loc" | "locrian" => Mode::Locrian,
            _ => return Err(LookupError::UnknownMode(s.to_string())),
        };
        Ok(mode)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Scale degree identifying a chord root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degree {
    I,
    II,
    III,
    IV,
    V,
    VI,
    VII,
}

impl Degree {
    pub const ALL: [Degree; 7] = [
        Degree::I,
        Degree::II,
        Degree::III,
        Degree::IV,
        Degree::V,
        Degree::VI,
        Degree::VII,
    ];

    /// Zero-based index into a mode's interval table.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Degree {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let degree = match s.trim().to_ascii_uppercase().as_str() {
            "I" => Degree::I,
            "II" => Degree::II,
            "III" => Degree::III,
            "IV" => Degree::IV,
            "V" => Degree::V,
            "VI" => Degree::VI,
            "VII" => Degree::VII,
            _ => return Err(LookupError::UnknownDegree(s.to_string())),
        };
        Ok(degree)
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = ["I", "II", "III", "IV", "V", "VI", "VII"][self.index()];
        f.write_str(name)
    }
}

fn step_index(step: u8) -> Result<usize, LookupError> {
    if (1..=7).contains(&step) {
        Ok(usize::from(step - 1))
    } else {
        Err(LookupError::StepOutOfRange(step))
    }
}

/// Pitch of scale index `index` (may exceed 6) in `key`+`mode`.
fn scale_pitch(key: Key, mode: Mode, index: usize) -> i32 {
    let octave = (index / 7) as i32;
    key.root() + i32::from(mode.intervals()[index % 7]) + 12 * octave
}

/// Step `step` (1-7) above `degree`, walking the song's own scale.
pub fn resolve_auto(key: Key, degree: Degree, mode: Mode, step: u8) -> Result<i32, LookupError> {
    let offset = step_index(step)?;
    Ok(scale_pitch(key, mode, degree.index() + offset))
}

/// Step `step` above `degree`, with `span_mode` replacing the song's mode
/// for the intervals above the root.
pub fn resolve_span_mode(
    key: Key,
    degree: Degree,
    key_mode: Mode,
    span_mode: Mode,
    step: u8,
) -> Result<i32, LookupError> {
    let offset = step_index(step)?;
    let root = scale_pitch(key, key_mode, degree.index());
    Ok(root + i32::from(span_mode.intervals()[offset]))
}

/// Narrow a resolved pitch to the MIDI range, failing outside 0-127.
pub fn checked_pitch(pitch: i32) -> Result<u8, LookupError> {
    u8::try_from(pitch)
        .ok()
        .filter(|&p| p <= 127)
        .ok_or(LookupError::PitchOutOfRange(pitch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_tonic_triad_in_c_ionian() {
        let c = Key::C;
        assert_eq!(resolve_auto(c, Degree::I, Mode::Ionian, 1).unwrap(), 60);
        assert_eq!(resolve_auto(c, Degree::I, Mode::Ionian, 3).unwrap(), 64);
        assert_eq!(resolve_auto(c, Degree::I, Mode::Ionian, 5).unwrap(), 67);
    }

    #[test]
    fn test_auto_wraps_into_next_octave() {
        // Degree VI step 3 in C Ionian: A, B, C -> the C above middle C.
        assert_eq!(
            resolve_auto(Key::C, Degree::VI, Mode::Ionian, 3).unwrap(),
            72
        );
        // Degree VII step 7 is six scale steps above B: A5.
        assert_eq!(
            resolve_auto(Key::C, Degree::VII, Mode::Ionian, 7).unwrap(),
            81
        );
    }

    #[test]
    fn test_auto_uses_key_offset() {
        // A Dorian, degree IV is D; its 3rd walks the scale to F#.
        assert_eq!(resolve_auto(Key::A, Degree::IV, Mode::Dorian, 1).unwrap(), 74);
        assert_eq!(resolve_auto(Key::A, Degree::IV, Mode::Dorian, 3).unwrap(), 78);
    }

    #[test]
    fn test_span_mode_overrides_intervals_only() {
        // C Ionian degree II is D. Auto gives D Dorian's F; a Mixolydian
        // override gives F#.
        assert_eq!(resolve_auto(Key::C, Degree::II, Mode::Ionian, 3).unwrap(), 65);
        assert_eq!(
            resolve_span_mode(Key::C, Degree::II, Mode::Ionian, Mode::Mixolydian, 3).unwrap(),
            66
        );
        // The root is unchanged by the override.
        assert_eq!(
            resolve_span_mode(Key::C, Degree::II, Mode::Ionian, Mode::Locrian, 1).unwrap(),
            62
        );
    }

    #[test]
    fn test_step_out_of_range() {
        assert_eq!(
            resolve_auto(Key::C, Degree::I, Mode::Ionian, 0),
            Err(LookupError::StepOutOfRange(0))
        );
        assert_eq!(
            resolve_span_mode(Key::C, Degree::I, Mode::Ionian, Mode::Dorian, 8),
            Err(LookupError::StepOutOfRange(8))
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Eb".parse::<Key>().unwrap(), Key::Eb);
        assert_eq!("D#".parse::<Key>().unwrap(), Key::Eb);
        assert_eq!("Cb".parse::<Key>().unwrap(), Key::B);
        assert_eq!("m".parse::<Mode>().unwrap(), Mode::Mixolydian);
        assert_eq!("Loc".parse::<Mode>().unwrap(), Mode::Locrian);
        assert_eq!("vii".parse::<Degree>().unwrap(), Degree::VII);
        assert!(matches!("H".parse::<Key>(), Err(LookupError::UnknownKey(_))));
        assert!(matches!("x".parse::<Mode>(), Err(LookupError::UnknownMode(_))));
        assert!(matches!("VIII".parse::<Degree>(), Err(LookupError::UnknownDegree(_))));
    }

    #[test]
    fn test_checked_pitch_bounds() {
        assert_eq!(checked_pitch(0).unwrap(), 0);
        assert_eq!(checked_pitch(127).unwrap(), 127);
        assert_eq!(checked_pitch(-1), Err(LookupError::PitchOutOfRange(-1)));
        assert_eq!(checked_pitch(128), Err(LookupError::PitchOutOfRange(128)));
    }

    #[test]
    fn test_every_mode_is_a_seven_note_scale() {
        for mode in Mode::ALL {
            let iv = mode.intervals();
            assert_eq!(iv[0], 0);
            assert!(iv.windows(2).all(|w| w[0] < w[1]), "{mode} not ascending");
            assert_eq!(mode.abbreviation().parse::<Mode>().unwrap(), mode);
        }
    }
}
