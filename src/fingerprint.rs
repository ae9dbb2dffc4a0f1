use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Reference ceiling for frequency-like measurements (Hz).
pub const REFERENCE_CEILING: f64 = 22050.0;
/// Normalization ceiling for spectral bandwidth (Hz).
pub const BANDWIDTH_CEILING: f64 = 4000.0;
/// Spectral profile size. The first 13 bins are seeded from the timbre
/// coefficients; centroid and rolloff add mass at scaled positions.
pub const SPECTRAL_BINS: usize = 16;
/// Tempo profile size: zcr, tempo hint, bandwidth, first three chroma bins.
pub const TEMPO_SLOTS: usize = 6;

/// One tick's raw measurements from the external feature source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeatureFrame {
    pub spectral_centroid: f64,
    pub spectral_bandwidth: f64,
    pub spectral_rolloff: f64,
    pub zero_crossing_rate: f64,
    /// Timbral coefficients (13 expected). Shorter vectors are zero-padded.
    pub timbre: Vec<f64>,
    /// Chroma vector. Anything but exactly 12 bins falls back to a uniform
    /// key profile.
    pub chroma: Vec<f64>,
    /// Instantaneous audio level in [0, 1].
    pub level: f64,
    /// External tempo hint in BPM (MIDI clock, tap tempo).
    pub tempo_hint: Option<f64>,
}

/// Coarse energy descriptor derived from level and spectral shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyProfile {
    pub level: f64,
    /// Centroid against the reference ceiling.
    pub brightness: f64,
    /// Bandwidth against its ceiling, capped at 1.
    pub spread: f64,
    /// Rolloff against the reference ceiling.
    pub high_freq: f64,
}

/// The normalized per-tick feature bundle.
#[derive(Debug, Clone)]
pub struct AudioFingerprint {
    pub spectral: [f64; SPECTRAL_BINS],
    pub tempo: [f64; TEMPO_SLOTS],
    pub energy: EnergyProfile,
    /// 12-bin chroma, or a uniform fallback when the frame had none.
    pub key_profile: [f64; 12],
    /// False when the uniform fallback was used.
    pub chroma_present: bool,
    /// External tempo hint carried through for the tempo axis.
    pub tempo_hint: Option<f64>,
    /// How much signal the frame carried, in [0, 1].
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl AudioFingerprint {
    /// Zero-crossing rate slot of the tempo profile.
    pub fn zcr(&self) -> f64 {
        self.tempo[0]
    }
}

/// Map a BPM hint onto [0, 1]: linear over 60-200 BPM, clamped.
pub fn normalize_tempo_hint(bpm: f64) -> f64 {
    ((bpm - 60.0) / 140.0).clamp(0.0, 1.0)
}

/// Builds one fingerprint per tick and keeps a bounded rolling history.
/// The history is informational (recent input quality); single-tick results
/// never depend on it.
#[derive(Debug)]
pub struct FeatureExtractor {
    history: VecDeque<AudioFingerprint>,
    capacity: usize,
}

impl FeatureExtractor {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Derive the fingerprint for this tick and record it in the history,
    /// evicting the oldest entry at capacity.
    pub fn extract(&mut self, frame: &FeatureFrame) -> AudioFingerprint {
        let fingerprint = build_fingerprint(frame);
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(fingerprint.clone());
        fingerprint
    }

    pub fn history(&self) -> impl Iterator<Item = &AudioFingerprint> {
        self.history.iter()
    }

    /// Mean fingerprint confidence over the rolling history (0 when empty).
    pub fn mean_confidence(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().map(|f| f.confidence).sum::<f64>() / self.history.len() as f64
    }
}

fn build_fingerprint(frame: &FeatureFrame) -> AudioFingerprint {
    // Spectral profile: timbre coefficients seed the low bins, then centroid
    // and rolloff add mass at positions scaled against the reference ceiling.
    let mut spectral = [0.0; SPECTRAL_BINS];
    for (bin, coeff) in spectral.iter_mut().zip(frame.timbre.iter().take(13)) {
        *bin = *coeff;
    }
    spectral[scaled_bin(frame.spectral_centroid)] += 0.5;
    spectral[scaled_bin(frame.spectral_rolloff)] += 0.3;

    let hint_norm = frame.tempo_hint.map(normalize_tempo_hint).unwrap_or(0.5);
    let spread = (frame.spectral_bandwidth / BANDWIDTH_CEILING).min(1.0);
    let tempo = [
        frame.zero_crossing_rate,
        hint_norm,
        spread,
        frame.chroma.first().copied().unwrap_or(0.0),
        frame.chroma.get(1).copied().unwrap_or(0.0),
        frame.chroma.get(2).copied().unwrap_or(0.0),
    ];

    let energy = EnergyProfile {
        level: frame.level,
        brightness: frame.spectral_centroid / REFERENCE_CEILING,
        spread,
        high_freq: frame.spectral_rolloff / REFERENCE_CEILING,
    };

    let (key_profile, chroma_present) = if frame.chroma.len() == 12 {
        let mut profile = [0.0; 12];
        profile.copy_from_slice(&frame.chroma);
        (profile, true)
    } else {
        ([1.0 / 12.0; 12], false)
    };

    AudioFingerprint {
        spectral,
        tempo,
        energy,
        key_profile,
        chroma_present,
        tempo_hint: frame.tempo_hint,
        confidence: frame_confidence(frame),
        timestamp: Utc::now(),
    }
}

/// Position of a frequency in the spectral profile, scaled against the
/// reference ceiling.
fn scaled_bin(freq: f64) -> usize {
    let ratio = (freq / REFERENCE_CEILING).clamp(0.0, 1.0);
    (ratio * (SPECTRAL_BINS - 1) as f64).round() as usize
}

/// Additive signal-presence heuristic. Increments sum to exactly 1.0 for a
/// frame that is loud, bright, wide, and timbrally active.
fn frame_confidence(frame: &FeatureFrame) -> f64 {
    let mut confidence: f64 = 0.0;
    if frame.level > 0.05 {
        confidence += 0.25;
    }
    if frame.level > 0.30 {
        confidence += 0.25;
    }
    if frame.spectral_centroid > 800.0 {
        confidence += 0.20;
    }
    if frame.spectral_bandwidth > 600.0 {
        confidence += 0.15;
    }
    if frame.timbre.iter().any(|c| c.abs() > 1.0) {
        confidence += 0.15;
    }
    confidence.clamp(0.0, 1.0)
}
