// Notation source: the on-disk JSON documents and their compilation.
//
// A song directory holds one document per concern:
//
//   song.json     {"song": {"name", "tempo"?, "key", "mode", "pattern": [names]}}
//   pattern.json  {"pattern": [{"name", "data"}]}
//   phrase.json   {"phrase": [{"type", "name", "note"?, "pre"?, "post"?,
//                              "data"?: {"inst"?, "note"?, "oct"?, "pre"?, "post"?}}]}
//   player.json   {"player": [{"type", "midi", "inst"}]}
//   mixer.json    {"mixer": {"fader": [{"type", "vol", "pan", "mute"}]}}   (optional)
//
// The records here are plain serde mirrors of those documents and carry no
// parsed notation. `SongSource::compile` does all of the parsing and name
// lookup, so every format or lookup error surfaces there, and builds a
// fresh `Composition` (new phrases with empty note lists and freshly seeded
// generators) on every call. Compiling the same source twice with the same
// config therefore yields equal tables.
//
// Phrase layout by type:
// - bass: one voice in `note`, with optional `pre` / `post` grids.
// - pad: voices in `data.note`, one octave per voice in `data.oct`
//   (defaults to 0), optional per-voice `data.pre` / `data.post`. A lone
//   `note` is accepted as a single voice.
// - drum: grids in `data.note`, percussion names in `data.inst`, paired by
//   position.
// - seque: no grids.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tickgrid_prng::NoteRng;
use tracing::{debug, info};

use crate::config::{EngineConfig, Resolution};
use crate::error::{Error, FormatError, LookupError, Result};
use crate::gm;
use crate::mixer::{Fader, Mixer};
use crate::notation::{Cell, Pattern, parse_drum_grid, parse_pitched_grid};
use crate::phrase::{BASS_INTERVAL, DrumVoice, Phrase, PhraseType, PitchedVoice, Strategy};
use crate::player::{Player, Program};
use crate::song::{Song, Tonality};

pub const SONG_FILE: &str = "song.json";
pub const PATTERN_FILE: &str = "pattern.json";
pub const PHRASE_FILE: &str = "phrase.json";
pub const PLAYER_FILE: &str = "player.json";
pub const MIXER_FILE: &str = "mixer.json";

/// Every file a song directory may contain, for change filtering.
pub const SOURCE_FILES: [&str; 5] = [SONG_FILE, PATTERN_FILE, PHRASE_FILE, PLAYER_FILE, MIXER_FILE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tempo: Option<u16>,
    pub key: String,
    pub mode: String,
    pub pattern: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub name: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceData {
    #[serde(default)]
    pub inst: Option<Vec<String>>,
    #[serde(default)]
    pub note: Option<Vec<String>>,
    #[serde(default)]
    pub oct: Option<Vec<i32>>,
    #[serde(default)]
    pub pre: Option<Vec<String>>,
    #[serde(default)]
    pub post: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub pre: Option<String>,
    #[serde(default)]
    pub post: Option<String>,
    #[serde(default)]
    pub data: Option<VoiceData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub midi: u8,
    pub inst: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaderRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub vol: u32,
    pub pan: String,
    #[serde(default)]
    pub mute: bool,
}

#[derive(Deserialize)]
struct SongFile {
    song: SongRecord,
}

#[derive(Deserialize)]
struct PatternFile {
    pattern: Vec<PatternRecord>,
}

#[derive(Deserialize)]
struct PhraseFile {
    phrase: Vec<PhraseRecord>,
}

#[derive(Deserialize)]
struct PlayerFile {
    player: Vec<PlayerRecord>,
}

#[derive(Deserialize)]
struct MixerFile {
    mixer: MixerRecord,
}

#[derive(Deserialize)]
struct MixerRecord {
    #[serde(default)]
    fader: Vec<FaderRecord>,
}

/// Unparsed notation for one song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongSource {
    pub song: SongRecord,
    pub patterns: Vec<PatternRecord>,
    pub phrases: Vec<PhraseRecord>,
    pub players: Vec<PlayerRecord>,
    #[serde(default)]
    pub faders: Vec<FaderRecord>,
}

/// A compiled song, ready to build into a message table.
#[derive(Debug, Clone)]
pub struct Composition {
    pub song: Song,
    pub players: Vec<Player>,
    pub mixer: Mixer,
    pub tempo_bpm: u16,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|source| Error::Resource {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl SongSource {
    /// Read every document in `dir`. `mixer.json` may be absent.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let song: SongFile = read_json(&dir.join(SONG_FILE))?;
        let patterns: PatternFile = read_json(&dir.join(PATTERN_FILE))?;
        let phrases: PhraseFile = read_json(&dir.join(PHRASE_FILE))?;
        let players: PlayerFile = read_json(&dir.join(PLAYER_FILE))?;
        let mixer_path = dir.join(MIXER_FILE);
        let faders = if mixer_path.exists() {
            read_json::<MixerFile>(&mixer_path)?.mixer.fader
        } else {
            Vec::new()
        };
        debug!(
            dir = %dir.display(),
            patterns = patterns.pattern.len(),
            phrases = phrases.phrase.len(),
            players = players.player.len(),
            faders = faders.len(),
            "loaded notation source"
        );
        Ok(Self {
            song: song.song,
            patterns: patterns.pattern,
            phrases: phrases.phrase,
            players: players.player,
            faders,
        })
    }

    /// Parse and resolve everything into a fresh composition.
    pub fn compile(&self, config: &EngineConfig) -> Result<Composition> {
        let resolution = config.resolution()?;
        let tonality = Tonality::new(self.song.key.parse()?, self.song.mode.parse()?);

        let mut patterns = BTreeMap::new();
        for record in &self.patterns {
            let pattern = Pattern::parse(&record.name, &record.data)?;
            patterns.insert(record.name.clone(), Arc::new(pattern));
        }
        let song = Song::arrange(tonality, resolution, &patterns, &self.song.pattern)?;

        let seed = config.seque_seed.unwrap_or(0);
        let phrases = self
            .phrases
            .iter()
            .enumerate()
            .map(|(i, record)| {
                record.to_phrase(resolution, config.velocity, seed.wrapping_add(i as u64))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut players = Vec::with_capacity(self.players.len());
        for record in &self.players {
            let phrase_type: PhraseType = record.kind.parse()?;
            let program = Program::for_channel(record.midi, &record.inst)?;
            let mut player = Player::new(record.midi, program, phrase_type)?;
            player.adopt(phrases.iter().cloned());
            players.push(player);
        }

        let faders = self
            .faders
            .iter()
            .map(|f| -> Result<Fader, LookupError> {
                Fader::new(f.kind.parse()?, f.vol, f.pan.parse()?, f.mute)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tempo_bpm = self.song.tempo.unwrap_or(config.tempo_bpm);
        info!(
            song = %self.song.name,
            key = %tonality.key,
            mode = %tonality.mode,
            instances = song.instances().len(),
            players = players.len(),
            tempo_bpm,
            "compiled song"
        );
        Ok(Composition {
            song,
            players,
            mixer: Mixer::new(faders),
            tempo_bpm,
        })
    }
}

/// Parse an optional per-voice grid list, checking it has one entry per voice.
fn per_voice_grids(
    name: &str,
    field: &'static str,
    grids: Option<&Vec<String>>,
    voices: usize,
) -> Result<Vec<Vec<Cell>>> {
    let Some(grids) = grids else {
        return Ok(vec![Vec::new(); voices]);
    };
    if grids.len() != voices {
        return Err(FormatError::VoiceMetadata {
            name: name.to_string(),
            field,
            voices,
            entries: grids.len(),
        }
        .into());
    }
    grids.iter().map(|g| parse_pitched_grid(g)).collect()
}

impl PhraseRecord {
    fn missing_grid(&self) -> Error {
        FormatError::MissingGrid {
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
        .into()
    }

    /// Voice grids from `data.note`, falling back to a lone `note`.
    fn voice_grids(&self) -> Option<Vec<&str>> {
        match (&self.data, &self.note) {
            (Some(VoiceData { note: Some(notes), .. }), _) => {
                Some(notes.iter().map(String::as_str).collect())
            }
            (_, Some(note)) => Some(vec![note.as_str()]),
            _ => None,
        }
    }

    fn to_phrase(&self, resolution: Resolution, velocity: u8, seed: u64) -> Result<Phrase> {
        let phrase_type: PhraseType = self.kind.parse()?;
        let data = self.data.clone().unwrap_or_default();
        let strategy = match phrase_type {
            PhraseType::Drum => {
                let grids = self.voice_grids().ok_or_else(|| self.missing_grid())?;
                let inst = data.inst.unwrap_or_default();
                if inst.len() != grids.len() {
                    return Err(FormatError::VoiceMetadata {
                        name: self.name.clone(),
                        field: "inst",
                        voices: grids.len(),
                        entries: inst.len(),
                    }
                    .into());
                }
                let voices = grids
                    .iter()
                    .zip(&inst)
                    .map(|(grid, name)| -> Result<DrumVoice> {
                        Ok(DrumVoice {
                            percussion: gm::percussion(name)?,
                            cells: parse_drum_grid(grid)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Strategy::Drum(voices)
            }
            PhraseType::Pad => {
                let grids = self.voice_grids().ok_or_else(|| self.missing_grid())?;
                let octaves = match data.oct {
                    Some(oct) if oct.len() != grids.len() => {
                        return Err(FormatError::VoiceMetadata {
                            name: self.name.clone(),
                            field: "oct",
                            voices: grids.len(),
                            entries: oct.len(),
                        }
                        .into());
                    }
                    Some(oct) => oct,
                    None => vec![0; grids.len()],
                };
                let pre = per_voice_grids(&self.name, "pre", data.pre.as_ref(), grids.len())?;
                let post = per_voice_grids(&self.name, "post", data.post.as_ref(), grids.len())?;
                let mut voices = Vec::with_capacity(grids.len());
                for (i, grid) in grids.iter().enumerate() {
                    let interval = octaves[i]
                        .checked_mul(12)
                        .ok_or(LookupError::OctaveOutOfRange(octaves[i]))?;
                    voices.push(
                        PitchedVoice::new(parse_pitched_grid(grid)?, interval)
                            .with_pre(pre[i].clone())
                            .with_post(post[i].clone()),
                    );
                }
                Strategy::Pad(voices)
            }
            PhraseType::Bass => {
                let grid = self.note.as_deref().ok_or_else(|| self.missing_grid())?;
                let mut voice = PitchedVoice::new(parse_pitched_grid(grid)?, BASS_INTERVAL);
                if let Some(pre) = &self.pre {
                    voice = voice.with_pre(parse_pitched_grid(pre)?);
                }
                if let Some(post) = &self.post {
                    voice = voice.with_post(parse_pitched_grid(post)?);
                }
                Strategy::Bass(voice)
            }
            PhraseType::Seque => Strategy::Seque(NoteRng::new(seed)),
        };
        Ok(Phrase::new(&self.name, strategy, resolution, velocity))
    }
}
