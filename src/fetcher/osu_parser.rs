//! Minimal `.osu` beatmap decoder
//!
//! Reads just enough of the text format to vet a download before it is handed
//! to the scoring oracle: the format header, the ruleset from `[General]`, a
//! few `[Metadata]` fields and the number of hit objects. The raw bytes are
//! kept alongside so the oracle receives the file exactly as served.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::BeatmapId;

const FORMAT_HEADER: &str = "osu file format v";

/// Game mode a beatmap is authored for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ruleset {
    /// osu!standard
    Osu,
    /// osu!taiko
    Taiko,
    /// osu!catch
    Catch,
    /// osu!mania
    Mania,
}

impl Ruleset {
    /// Map the numeric `Mode` value used in `.osu` files.
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Ruleset::Osu),
            1 => Some(Ruleset::Taiko),
            2 => Some(Ruleset::Catch),
            3 => Some(Ruleset::Mania),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ruleset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Ruleset::Osu => "osu",
            Ruleset::Taiko => "taiko",
            Ruleset::Catch => "catch",
            Ruleset::Mania => "mania",
        };
        write!(f, "{s}")
    }
}

/// Decoding failures
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Server returned an empty body (unknown or unavailable beatmap)
    #[error("beatmap body is empty")]
    Empty,

    /// Body is not UTF-8 text
    #[error("beatmap is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    /// First line is not an `osu file format` header
    #[error("missing 'osu file format' header")]
    MissingHeader,

    /// A field could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Field name
        key: String,
        /// Offending raw value
        value: String,
    },

    /// Beatmap belongs to a ruleset the oracle cannot score
    #[error("unsupported ruleset '{0}' (likely wrong ruleset for this calculator)")]
    UnsupportedRuleset(Ruleset),
}

/// Beatmap ready for scoring
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBeatmap {
    /// Beatmap identifier the file was fetched for
    pub id: BeatmapId,
    /// `.osu` format revision
    pub format_version: u32,
    /// Ruleset from `[General] Mode`
    pub ruleset: Ruleset,
    /// Song title
    pub title: String,
    /// Song artist
    pub artist: String,
    /// Difficulty name
    pub difficulty_name: String,
    /// Number of entries in `[HitObjects]`
    pub hit_objects: usize,
    raw: Bytes,
}

impl DecodedBeatmap {
    /// Original file contents
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

/// Turns a downloaded body into a [`DecodedBeatmap`].
pub trait BeatmapDecoder: Send + Sync {
    /// Decode `raw`, which was fetched for `id`.
    fn decode(&self, id: BeatmapId, raw: Bytes) -> Result<DecodedBeatmap, DecodeError>;
}

/// Decoder for the `.osu` text format that accepts a single ruleset
#[derive(Debug, Clone)]
pub struct OsuFileDecoder {
    accepted: Ruleset,
}

impl Default for OsuFileDecoder {
    fn default() -> Self {
        Self::new(Ruleset::Osu)
    }
}

impl OsuFileDecoder {
    /// Create a decoder that rejects every ruleset except `accepted`.
    pub fn new(accepted: Ruleset) -> Self {
        Self { accepted }
    }
}

impl BeatmapDecoder for OsuFileDecoder {
    fn decode(&self, id: BeatmapId, raw: Bytes) -> Result<DecodedBeatmap, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }

        let text =
            std::str::from_utf8(&raw).map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
        let text = text.trim_start_matches('\u{feff}');

        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
        let header = lines.next().ok_or(DecodeError::Empty)?;
        let version = header
            .strip_prefix(FORMAT_HEADER)
            .ok_or(DecodeError::MissingHeader)?
            .trim();
        let format_version = version.parse::<u32>().map_err(|_| DecodeError::InvalidValue {
            key: "format version".to_string(),
            value: version.to_string(),
        })?;

        let mut section: Option<&str> = None;
        let mut mode = 0u8;
        let mut title = String::new();
        let mut artist = String::new();
        let mut difficulty_name = String::new();
        let mut hit_objects = 0usize;

        for line in lines {
            if line.starts_with("//") {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(name);
                continue;
            }

            match section {
                Some("General") => {
                    if let Some(("Mode", value)) = split_pair(line) {
                        mode = value.parse().map_err(|_| DecodeError::InvalidValue {
                            key: "Mode".to_string(),
                            value: value.to_string(),
                        })?;
                    }
                }
                Some("Metadata") => match split_pair(line) {
                    Some(("Title", value)) => title = value.to_string(),
                    Some(("Artist", value)) => artist = value.to_string(),
                    Some(("Version", value)) => difficulty_name = value.to_string(),
                    _ => {}
                },
                Some("HitObjects") => hit_objects += 1,
                _ => {}
            }
        }

        let ruleset = Ruleset::from_mode(mode).ok_or_else(|| DecodeError::InvalidValue {
            key: "Mode".to_string(),
            value: mode.to_string(),
        })?;
        if ruleset != self.accepted {
            return Err(DecodeError::UnsupportedRuleset(ruleset));
        }

        Ok(DecodedBeatmap {
            id,
            format_version,
            ruleset,
            title,
            artist,
            difficulty_name,
            hit_objects,
            raw,
        })
    }
}

fn split_pair(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
        .map(|(key, value)| (key.trim(), value.trim()))
}
