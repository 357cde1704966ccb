// General MIDI name tables.
//
// Players name their instrument and drum kit, and drum voices name their
// percussion key, by General MIDI names. Names match loosely: case, spaces,
// underscores, hyphens and parentheses are ignored, so `Lead_1_square`,
// `lead 1 (square)` and `LEAD1SQUARE` are the same program. A plain number
// is accepted anywhere a name is.

use crate::error::LookupError;

/// GM program names, indexed by program number.
const INSTRUMENTS: [&str; 128] = [
    "Acoustic Grand Piano",
    "Bright Acoustic Piano",
    "Electric Grand Piano",
    "Honky-tonk Piano",
    "Electric Piano 1",
    "Electric Piano 2",
    "Harpsichord",
    "Clavi",
    "Celesta",
    "Glockenspiel",
    "Music Box",
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Tubular Bells",
    "Dulcimer",
    "Drawbar Organ",
    "Percussive Organ",
    "Rock Organ",
    "Church Organ",
    "Reed Organ",
    "Accordion",
    "Harmonica",
    "Tango Accordion",
    "Acoustic Guitar (nylon)",
    "Acoustic Guitar (steel)",
    "Electric Guitar (jazz)",
    "Electric Guitar (clean)",
    "Electric Guitar (muted)",
    "Overdriven Guitar",
    "Distortion Guitar",
    "Guitar harmonics",
    "Acoustic Bass",
    "Electric Bass (finger)",
    "Electric Bass (pick)",
    "Fretless Bass",
    "Slap Bass 1",
    "Slap Bass 2",
    "Synth Bass 1",
    "Synth Bass 2",
    "Violin",
    "Viola",
    "Cello",
    "Contrabass",
    "Tremolo Strings",
    "Pizzicato Strings",
    "Orchestral Harp",
    "Timpani",
    "String Ensemble 1",
    "String Ensemble 2",
    "SynthStrings 1",
    "SynthStrings 2",
    "Choir Aahs",
    "Voice Oohs",
    "Synth Voice",
    "Orchestra Hit",
    "Trumpet",
    "Trombone",
    "Tuba",
    "Muted Trumpet",
    "French Horn",
    "Brass Section",
    "SynthBrass 1",
    "SynthBrass 2",
    "Soprano Sax",
    "Alto Sax",
    "Tenor Sax",
    "Baritone Sax",
    "Oboe",
    "English Horn",
    "Bassoon",
    "Clarinet",
    "Piccolo",
    "Flute",
    "Recorder",
    "Pan Flute",
    "Blown Bottle",
    "Shakuhachi",
    "Whistle",
    "Ocarina",
    "Lead 1 (square)",
    "Lead 2 (sawtooth)",
    "Lead 3 (calliope)",
    "Lead 4 (chiff)",
    "Lead 5 (charang)",
    "Lead 6 (voice)",
    "Lead 7 (fifths)",
    "Lead 8 (bass + lead)",
    "Pad 1 (new age)",
    "Pad 2 (warm)",
    "Pad 3 (polysynth)",
    "Pad 4 (choir)",
    "Pad 5 (bowed)",
    "Pad 6 (metallic)",
    "Pad 7 (halo)",
    "Pad 8 (sweep)",
    "FX 1 (rain)",
    "FX 2 (soundtrack)",
    "FX 3 (crystal)",
    "FX 4 (atmosphere)",
    "FX 5 (brightness)",
    "FX 6 (goblins)",
    "FX 7 (echoes)",
    "FX 8 (sci-fi)",
    "Sitar",
    "Banjo",
    "Shamisen",
    "Koto",
    "Kalimba",
    "Bag pipe",
    "Fiddle",
    "Shanai",
    "Tinkle Bell",
    "Agogo",
    "Steel Drums",
    "Woodblock",
    "Taiko Drum",
    "Melodic Tom",
    "Synth Drum",
    "Reverse Cymbal",
    "Guitar Fret Noise",
    "Breath Noise",
    "Seashore",
    "Bird Tweet",
    "Telephone Ring",
    "Helicopter",
    "Applause",
    "Gunshot",
];

/// GM2 drum kits as (name, program).
const DRUM_KITS: [(&str, u8); 9] = [
    ("Standard", 0),
    ("Room", 8),
    ("Power", 16),
    ("Electronic", 24),
    ("Analog", 25),
    ("Jazz", 32),
    ("Brush", 40),
    ("Orchestra", 48),
    ("SFX", 56),
];

/// GM percussion key map, starting at key 35.
const PERCUSSION_BASE: u8 = 35;
const PERCUSSION: [&str; 47] = [
    "Acoustic Bass Drum",
    "Bass Drum 1",
    "Side Stick",
    "Acoustic Snare",
    "Hand Clap",
    "Electric Snare",
    "Low Floor Tom",
    "Closed Hi Hat",
    "High Floor Tom",
    "Pedal Hi Hat",
    "Low Tom",
    "Open Hi Hat",
    "Low Mid Tom",
    "Hi Mid Tom",
    "Crash Cymbal 1",
    "High Tom",
    "Ride Cymbal 1",
    "Chinese Cymbal",
    "Ride Bell",
    "Tambourine",
    "Splash Cymbal",
    "Cowbell",
    "Crash Cymbal 2",
    "Vibraslap",
    "Ride Cymbal 2",
    "Hi Bongo",
    "Low Bongo",
    "Mute Hi Conga",
    "Open Hi Conga",
    "Low Conga",
    "High Timbale",
    "Low Timbale",
    "High Agogo",
    "Low Agogo",
    "Cabasa",
    "Maracas",
    "Short Whistle",
    "Long Whistle",
    "Short Guiro",
    "Long Guiro",
    "Claves",
    "Hi Wood Block",
    "Low Wood Block",
    "Mute Cuica",
    "Open Cuica",
    "Mute Triangle",
    "Open Triangle",
];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn parse_number(name: &str) -> Option<u8> {
    name.trim().parse::<u8>().ok().filter(|&n| n <= 127)
}

/// GM program number for an instrument name.
pub fn instrument(name: &str) -> Result<u8, LookupError> {
    if let Some(n) = parse_number(name) {
        return Ok(n);
    }
    let wanted = normalize(name);
    INSTRUMENTS
        .iter()
        .position(|candidate| normalize(candidate) == wanted)
        .map(|i| i as u8)
        .ok_or_else(|| LookupError::UnknownInstrument(name.to_string()))
}

/// Program number of a drum kit.
pub fn drum_kit(name: &str) -> Result<u8, LookupError> {
    if let Some(n) = parse_number(name) {
        return Ok(n);
    }
    let wanted = normalize(name);
    let wanted = wanted.strip_suffix("kit").unwrap_or(&wanted);
    DRUM_KITS
        .iter()
        .find(|(candidate, _)| normalize(candidate) == wanted)
        .map(|&(_, program)| program)
        .ok_or_else(|| LookupError::UnknownDrumKit(name.to_string()))
}

/// Note number of a percussion sound on the drum channel.
pub fn percussion(name: &str) -> Result<u8, LookupError> {
    if let Some(n) = parse_number(name) {
        return Ok(n);
    }
    let wanted = normalize(name);
    PERCUSSION
        .iter()
        .position(|candidate| normalize(candidate) == wanted)
        .map(|i| PERCUSSION_BASE + i as u8)
        .ok_or_else(|| LookupError::UnknownPercussion(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_names_match_loosely() {
        assert_eq!(instrument("Acoustic Grand Piano").unwrap(), 0);
        assert_eq!(instrument("Synth_Bass_1").unwrap(), 38);
        assert_eq!(instrument("Lead_1_square").unwrap(), 80);
        assert_eq!(instrument("lead 1 (square)").unwrap(), 80);
        assert_eq!(instrument("42").unwrap(), 42);
        assert_eq!(instrument("Gunshot").unwrap(), 127);
        assert!(matches!(
            instrument("Kazoo"),
            Err(LookupError::UnknownInstrument(_))
        ));
        assert!(instrument("128").is_err());
    }

    #[test]
    fn test_percussion_keys() {
        assert_eq!(percussion("Bass_Drum_1").unwrap(), 36);
        assert_eq!(percussion("Acoustic Snare").unwrap(), 38);
        assert_eq!(percussion("Closed_Hi_Hat").unwrap(), 42);
        assert_eq!(percussion("Open Triangle").unwrap(), 81);
        assert!(percussion("Gong").is_err());
    }

    #[test]
    fn test_drum_kits() {
        assert_eq!(drum_kit("Standard").unwrap(), 0);
        assert_eq!(drum_kit("Jazz_Kit").unwrap(), 32);
        assert_eq!(drum_kit("sfx").unwrap(), 56);
        assert!(drum_kit("Garage").is_err());
    }
}
