use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// BPM assigned when the source record has none.
pub const DEFAULT_BPM: f64 = 120.0;
/// Duration (seconds) assigned when the source record has none.
pub const DEFAULT_DURATION_SECS: f64 = 180.0;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Per-section energy breakdown on a 0-10 scale.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnergySummary {
    pub overall: f64,
    #[serde(default)]
    pub intro: Option<f64>,
    #[serde(default)]
    pub verse: Option<f64>,
    #[serde(default)]
    pub chorus: Option<f64>,
    #[serde(default)]
    pub outro: Option<f64>,
}

/// Relative section lengths as fractions of the track duration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SongStructure {
    pub intro_ratio: f64,
    pub verse_ratio: f64,
    pub chorus_ratio: f64,
    pub outro_ratio: f64,
}

/// A raw catalog record as handed over by the loader.
/// Everything but the id is optional; validation decides what is usable.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackSource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub energy: Option<EnergySummary>,
    #[serde(default)]
    pub structure: Option<SongStructure>,
}

/// A validated track record. Immutable after load.
#[derive(Debug, Serialize)]
pub struct TrackRecord {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub bpm: f64,
    /// Pitch-class name, optionally with a minor suffix (e.g. "Am", "F#").
    pub key: Option<String>,
    /// Free-text genre tag from the source library.
    pub genre: Option<String>,
    pub duration_secs: f64,
    pub energy: Option<EnergySummary>,
    pub structure: Option<SongStructure>,
}

impl TrackRecord {
    /// Pitch-class index (0 = C, ..., 11 = B) of the declared key, if any.
    /// An unrecognized key name falls back to pitch class 0.
    pub fn key_index(&self) -> Option<usize> {
        self.key
            .as_deref()
            .map(|k| pitch_class_index(k).unwrap_or(0))
    }
}

/// Map a key name to its pitch class (0 = C, ..., 11 = B).
/// Handles sharps and flats; a trailing minor marker ("m", "min", "minor")
/// is stripped first.
pub fn pitch_class_index(name: &str) -> Option<usize> {
    let lower = name.trim().to_lowercase();
    let mut base = lower.as_str();
    for marker in ["minor", "min", "m"] {
        if let Some(stripped) = base.strip_suffix(marker) {
            if !stripped.is_empty() {
                base = stripped.trim_end();
                break;
            }
        }
    }
    match base {
        "c" => Some(0),
        "c#" | "db" => Some(1),
        "d" => Some(2),
        "d#" | "eb" => Some(3),
        "e" => Some(4),
        "f" => Some(5),
        "f#" | "gb" => Some(6),
        "g" => Some(7),
        "g#" | "ab" => Some(8),
        "a" => Some(9),
        "a#" | "bb" => Some(10),
        "b" => Some(11),
        _ => None,
    }
}

/// Load summary returned when a catalog is (re)built.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CatalogSummary {
    pub loaded: usize,
    pub rejected: usize,
}

/// The in-memory catalog. Tracks are shared by `Arc` into candidates,
/// never deep-copied per tick.
#[derive(Debug, Default)]
pub struct Catalog {
    tracks: Vec<Arc<TrackRecord>>,
    rejected: usize,
}

impl Catalog {
    /// Validate and ingest loader records. A record with no name, no artist,
    /// and no positive BPM carries nothing to match on and is dropped;
    /// missing numeric fields on surviving records get defaults.
    pub fn from_sources(sources: Vec<TrackSource>) -> Self {
        let mut tracks = Vec::with_capacity(sources.len());
        let mut rejected = 0usize;

        for source in sources {
            match validate(source) {
                Some(record) => tracks.push(Arc::new(record)),
                None => rejected += 1,
            }
        }

        if tracks.is_empty() && rejected > 0 {
            log::warn!("catalog loaded but contains zero usable tracks ({rejected} rejected)");
        }

        Self { tracks, rejected }
    }

    pub fn tracks(&self) -> &[Arc<TrackRecord>] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Source records that failed validation on the last load.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            loaded: self.tracks.len(),
            rejected: self.rejected,
        }
    }
}

fn validate(source: TrackSource) -> Option<TrackRecord> {
    let has_name = source.name.as_deref().is_some_and(|n| !n.trim().is_empty());
    let has_artist = source
        .artist
        .as_deref()
        .is_some_and(|a| !a.trim().is_empty());
    let has_bpm = source.bpm.is_some_and(|b| b > 0.0);

    if !has_name && !has_artist && !has_bpm {
        log::debug!("dropping unusable catalog record {}", source.id);
        return None;
    }

    Some(TrackRecord {
        id: source.id,
        name: source
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        artist: source
            .artist
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        bpm: source.bpm.filter(|b| *b > 0.0).unwrap_or(DEFAULT_BPM),
        key: source.key.filter(|k| !k.trim().is_empty()),
        genre: source.genre.filter(|g| !g.trim().is_empty()),
        duration_secs: source
            .duration_secs
            .filter(|d| *d > 0.0)
            .unwrap_or(DEFAULT_DURATION_SECS),
        energy: source.energy,
        structure: source.structure,
    })
}

/// Read raw catalog records from a JSON file (array of objects).
pub fn load_sources(path: &Path) -> Result<Vec<TrackSource>, CatalogError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })
}
