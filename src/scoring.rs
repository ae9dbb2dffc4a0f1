use std::cmp::Ordering;
use std::sync::Arc;

use crate::catalog::{Catalog, TrackRecord};
use crate::config::EngineParams;
use crate::enhancement::estimate_time_offset;
use crate::fingerprint::AudioFingerprint;
use crate::genre::{self, DetectedGenre};

/// Ordered (max BPM difference, score) steps for the tempo axis.
const TEMPO_STEPS: &[(f64, f64)] = &[
    (3.0, 1.0),
    (6.0, 0.9),
    (10.0, 0.7),
    (15.0, 0.5),
    (20.0, 0.3),
];
/// Tempo score past the last step.
const TEMPO_FLOOR: f64 = 0.1;

/// Ordered (max level difference, score) steps for the energy axis.
const ENERGY_STEPS: &[(f64, f64)] = &[(0.2, 1.0), (0.4, 0.7), (0.6, 0.4)];
/// Energy score past the last step.
const ENERGY_FLOOR: f64 = 0.1;

/// Minimum level considered non-trivial for the energy comparison.
const MIN_ENERGY_LEVEL: f64 = 0.05;

/// A scored catalog track for one tick. Rebuilt every tick, never persisted.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub track: Arc<TrackRecord>,
    pub tempo_score: f64,
    pub key_score: f64,
    pub energy_score: f64,
    pub spectral_score: f64,
    /// Weighted aggregate in [0, 1]; 0 means gated or under the noise floor.
    pub overall: f64,
    /// Estimated playback position (level-bucket proxy, no true playhead).
    pub time_offset_secs: f64,
    /// Human-readable scoring notes; explanatory only, never fed back into
    /// ranking.
    pub reasons: Vec<String>,
}

/// Scores and ranks the catalog against one tick's fingerprint.
/// Full linear scan per tick; the per-track arithmetic is fixed-cost.
#[derive(Debug)]
pub struct MatchScorer {
    params: EngineParams,
}

impl MatchScorer {
    pub fn new(params: EngineParams) -> Self {
        Self { params }
    }

    /// Score every catalog track, drop the gated and sub-floor ones, rank
    /// descending, and keep the strongest candidates.
    pub fn rank(&self, catalog: &Catalog, fingerprint: &AudioFingerprint) -> Vec<MatchCandidate> {
        let detected = genre::detect(fingerprint);
        let estimated_bpm = estimate_bpm(fingerprint);

        let mut candidates: Vec<MatchCandidate> = catalog
            .tracks()
            .iter()
            .filter_map(|track| self.score_track(track, fingerprint, detected, estimated_bpm))
            .collect();

        candidates.sort_by(|a, b| {
            b.overall
                .partial_cmp(&a.overall)
                .unwrap_or(Ordering::Equal)
        });
        candidates.truncate(self.params.max_candidates);

        log::trace!(
            "ranked {} candidates (detected genre: {})",
            candidates.len(),
            detected.label()
        );
        candidates
    }

    fn score_track(
        &self,
        track: &Arc<TrackRecord>,
        fingerprint: &AudioFingerprint,
        detected: DetectedGenre,
        estimated_bpm: Option<f64>,
    ) -> Option<MatchCandidate> {
        let tempo = tempo_score(estimated_bpm, track.bpm);
        let key = key_score(track, fingerprint);
        let energy = energy_score(track, fingerprint);

        // Hard gate: a family mismatch zeroes the whole candidate, including
        // the axes already computed above.
        let (tempo, key, energy, spectral) =
            if genre::incompatible(detected, track.genre.as_deref()) {
                (0.0, 0.0, 0.0, 0.0)
            } else {
                let spectral =
                    genre::signature_score(detected, track.genre.as_deref(), fingerprint);
                (tempo, key, energy, spectral)
            };

        let p = &self.params;
        let mut overall = p.tempo_weight * tempo
            + p.spectral_weight * spectral
            + p.energy_weight * energy
            + p.key_weight * key;
        if overall <= p.noise_floor {
            overall = 0.0;
        }
        if overall <= 0.0 {
            return None;
        }

        log::trace!(
            "{} — {}: tempo {:.2} spectral {:.2} energy {:.2} key {:.2} -> {:.2}",
            track.artist,
            track.name,
            tempo,
            spectral,
            energy,
            key,
            overall
        );

        Some(MatchCandidate {
            track: Arc::clone(track),
            tempo_score: tempo,
            key_score: key,
            energy_score: energy,
            spectral_score: spectral,
            overall,
            time_offset_secs: estimate_time_offset(fingerprint.energy.level, track.duration_secs),
            reasons: reasons(tempo, key, energy, spectral, overall, detected),
        })
    }
}

/// Estimate the playing BPM: prefer the external hint, else a coarse default
/// nudged by spectral brightness and adjusted for high zero-crossing activity.
fn estimate_bpm(fingerprint: &AudioFingerprint) -> Option<f64> {
    if let Some(hint) = fingerprint.tempo_hint {
        if hint > 0.0 {
            return Some(hint);
        }
    }
    let mut bpm = match fingerprint.energy.brightness {
        b if b < 0.12 => 100.0,
        b if b > 0.35 => 128.0,
        _ => 120.0,
    };
    if fingerprint.zcr() > 0.15 {
        bpm += 8.0;
    }
    Some(bpm)
}

/// Walk an ordered step table: first step whose threshold admits `diff` wins.
fn step_score(table: &[(f64, f64)], diff: f64, floor: f64) -> f64 {
    for &(max_diff, score) in table {
        if diff <= max_diff {
            return score;
        }
    }
    floor
}

fn tempo_score(estimated_bpm: Option<f64>, track_bpm: f64) -> f64 {
    let Some(estimate) = estimated_bpm else {
        return 0.0;
    };
    if track_bpm <= 0.0 {
        return 0.0;
    }
    step_score(TEMPO_STEPS, (estimate - track_bpm).abs(), TEMPO_FLOOR)
}

/// Chroma support for the track's declared key. Only meaningful when the
/// frame carried a real chroma vector — the uniform fallback scores 0.
fn key_score(track: &TrackRecord, fingerprint: &AudioFingerprint) -> f64 {
    if !fingerprint.chroma_present {
        return 0.0;
    }
    let Some(index) = track.key_index() else {
        return 0.0;
    };
    let raw = (fingerprint.key_profile[index] * 2.0).min(1.0);
    // Diminishing returns: marginal chroma support is discounted, weak
    // support zeroed.
    if raw <= 0.4 {
        0.0
    } else if raw <= 0.6 {
        raw * 0.7
    } else {
        raw
    }
}

fn energy_score(track: &TrackRecord, fingerprint: &AudioFingerprint) -> f64 {
    let Some(energy) = &track.energy else {
        return 0.0;
    };
    if fingerprint.energy.level <= MIN_ENERGY_LEVEL {
        return 0.0;
    }
    let diff = (energy.overall / 10.0 - fingerprint.energy.level).abs();
    step_score(ENERGY_STEPS, diff, ENERGY_FLOOR)
}

/// Post-hoc explanation strings from fixed per-axis thresholds.
fn reasons(
    tempo: f64,
    key: f64,
    energy: f64,
    spectral: f64,
    overall: f64,
    detected: DetectedGenre,
) -> Vec<String> {
    let mut reasons = Vec::new();
    if tempo > 0.7 {
        reasons.push("strong BPM match".to_string());
    }
    if key > 0.6 {
        reasons.push("key matches chroma peak".to_string());
    }
    if energy > 0.7 {
        reasons.push("energy level matches".to_string());
    }
    if spectral > 0.6 {
        reasons.push(format!("{} spectral signature", detected.label()));
    }
    if overall > 0.8 {
        reasons.push("high overall similarity".to_string());
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, EnergySummary, TrackSource};
    use crate::fingerprint::{FeatureExtractor, FeatureFrame};

    fn track_source(id: &str, name: &str, bpm: f64, genre: Option<&str>) -> TrackSource {
        TrackSource {
            id: id.to_string(),
            name: Some(name.to_string()),
            artist: Some("Test Artist".to_string()),
            bpm: Some(bpm),
            key: None,
            genre: genre.map(str::to_string),
            duration_secs: Some(240.0),
            energy: None,
            structure: None,
        }
    }

    /// Bright, wide frame that classifies as electronic with a 0.9 signature.
    fn electronic_frame(tempo_hint: Option<f64>) -> FeatureFrame {
        FeatureFrame {
            spectral_centroid: 8000.0,
            spectral_bandwidth: 3000.0,
            spectral_rolloff: 16000.0,
            zero_crossing_rate: 0.1,
            timbre: vec![1.5; 13],
            chroma: vec![0.0; 12],
            level: 0.6,
            tempo_hint,
        }
    }

    fn extract(frame: &FeatureFrame) -> AudioFingerprint {
        FeatureExtractor::new(1).extract(frame)
    }

    #[test]
    fn step_tables_honor_boundaries() {
        assert!((step_score(TEMPO_STEPS, 3.0, TEMPO_FLOOR) - 1.0).abs() < 1e-12);
        assert!((step_score(TEMPO_STEPS, 3.1, TEMPO_FLOOR) - 0.9).abs() < 1e-12);
        assert!((step_score(TEMPO_STEPS, 20.0, TEMPO_FLOOR) - 0.3).abs() < 1e-12);
        assert!((step_score(TEMPO_STEPS, 45.0, TEMPO_FLOOR) - 0.1).abs() < 1e-12);
        assert!((step_score(ENERGY_STEPS, 0.15, ENERGY_FLOOR) - 1.0).abs() < 1e-12);
        assert!((step_score(ENERGY_STEPS, 0.95, ENERGY_FLOOR) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn tempo_prefers_the_external_hint() {
        let fp = extract(&electronic_frame(Some(174.0)));
        let catalog = Catalog::from_sources(vec![track_source("t1", "Jungle", 174.0, None)]);
        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&catalog, &fp);
        assert!((ranked[0].tempo_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tempo_heuristic_without_hint_nudges_by_brightness() {
        // Bright electronic frame, no hint: estimate 128
        let fp = extract(&electronic_frame(None));
        let catalog = Catalog::from_sources(vec![track_source("t1", "Anthem", 128.0, None)]);
        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&catalog, &fp);
        assert!((ranked[0].tempo_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn genre_mismatch_zeroes_every_axis() {
        // Electronic-sounding audio vs a declared rock track that would
        // otherwise score well on tempo.
        let fp = extract(&electronic_frame(Some(128.0)));
        let catalog = Catalog::from_sources(vec![
            track_source("t1", "Guitar Anthem", 128.0, Some("Hard Rock")),
            track_source("t2", "Warehouse", 128.0, Some("Techno")),
        ]);
        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&catalog, &fp);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].track.id, "t2");
    }

    #[test]
    fn genreless_track_gets_the_neutral_spectral_tier() {
        // Bright electronic audio must not lend its 0.9 signature to a track
        // that declares no genre at all.
        let fp = extract(&electronic_frame(Some(128.0)));
        let catalog = Catalog::from_sources(vec![
            track_source("t1", "Untagged", 128.0, None),
            track_source("t2", "Warehouse", 128.0, Some("Techno")),
        ]);
        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&catalog, &fp);
        let untagged = ranked.iter().find(|c| c.track.id == "t1").unwrap();
        let tagged = ranked.iter().find(|c| c.track.id == "t2").unwrap();
        assert!((untagged.spectral_score - 0.5).abs() < 1e-12);
        assert!((tagged.spectral_score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn sub_floor_aggregate_is_forced_to_zero_and_excluded() {
        // Unknown-shaped, silent-ish audio: spectral 0.5 neutral, tempo 0.1
        // at best, nothing else -> aggregate under the 0.25 floor.
        let frame = FeatureFrame {
            spectral_centroid: 4500.0,
            spectral_bandwidth: 1200.0,
            spectral_rolloff: 10000.0,
            level: 0.0,
            ..FeatureFrame::default()
        };
        let fp = extract(&frame);
        let catalog = Catalog::from_sources(vec![track_source("t1", "Faraway", 60.0, None)]);
        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&catalog, &fp);
        assert!(ranked.is_empty());
    }

    #[test]
    fn ranking_is_descending_and_truncated() {
        let mut sources = Vec::new();
        for i in 0..25 {
            // BPMs spread so tempo scores differ across the catalog
            sources.push(track_source(&format!("t{i}"), "Track", 100.0 + i as f64 * 4.0, None));
        }
        let fp = extract(&electronic_frame(Some(128.0)));
        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&Catalog::from_sources(sources), &fp);
        assert!(ranked.len() <= 10);
        for pair in ranked.windows(2) {
            assert!(pair[0].overall >= pair[1].overall);
        }
    }

    #[test]
    fn key_axis_needs_real_chroma_and_a_declared_key() {
        let mut frame = electronic_frame(Some(128.0));
        let mut chroma = vec![0.02; 12];
        chroma[9] = 0.9; // strong A
        frame.chroma = chroma;
        let fp = extract(&frame);

        let mut with_key = track_source("t1", "Strobe", 128.0, Some("House"));
        with_key.key = Some("Am".to_string());
        let without_key = track_source("t2", "Ghosts", 128.0, Some("House"));

        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&Catalog::from_sources(vec![with_key, without_key]), &fp);
        let keyed = ranked.iter().find(|c| c.track.id == "t1").unwrap();
        let unkeyed = ranked.iter().find(|c| c.track.id == "t2").unwrap();
        assert!((keyed.key_score - 1.0).abs() < 1e-12);
        assert!((unkeyed.key_score - 0.0).abs() < 1e-12);
    }

    #[test]
    fn key_score_applies_diminishing_returns() {
        let params = EngineParams::default();
        let scorer = MatchScorer::new(params);

        let mut cases = Vec::new();
        // (chroma value at pitch class 0, expected score)
        cases.push((0.15, 0.0)); // raw 0.3 <= 0.4
        cases.push((0.25, 0.5 * 0.7)); // raw 0.5, discounted
        cases.push((0.45, 0.9)); // raw 0.9, full

        for (value, expected) in cases {
            let mut frame = electronic_frame(Some(128.0));
            let mut chroma = vec![0.0; 12];
            chroma[0] = value;
            frame.chroma = chroma;
            let fp = extract(&frame);

            let mut source = track_source("t1", "Cirrus", 128.0, Some("Electronic"));
            source.key = Some("C".to_string());
            let ranked = scorer.rank(&Catalog::from_sources(vec![source]), &fp);
            assert!(
                (ranked[0].key_score - expected).abs() < 1e-9,
                "chroma {value} -> expected {expected}, got {}",
                ranked[0].key_score
            );
        }
    }

    #[test]
    fn energy_axis_needs_metadata_and_signal() {
        let fp = extract(&electronic_frame(Some(128.0))); // level 0.6
        let mut with_energy = track_source("t1", "Opus", 128.0, Some("House"));
        with_energy.energy = Some(EnergySummary {
            overall: 6.5,
            intro: None,
            verse: None,
            chorus: None,
            outro: None,
        });
        let without_energy = track_source("t2", "Drift", 128.0, Some("House"));

        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&Catalog::from_sources(vec![with_energy, without_energy]), &fp);
        let metered = ranked.iter().find(|c| c.track.id == "t1").unwrap();
        let bare = ranked.iter().find(|c| c.track.id == "t2").unwrap();
        // |6.5/10 - 0.6| = 0.05 -> top step
        assert!((metered.energy_score - 1.0).abs() < 1e-12);
        assert!((bare.energy_score - 0.0).abs() < 1e-12);
    }

    #[test]
    fn reasons_describe_strong_axes() {
        let mut frame = electronic_frame(Some(128.0));
        let mut chroma = vec![0.02; 12];
        chroma[9] = 0.9;
        frame.chroma = chroma;
        let fp = extract(&frame);

        let mut source = track_source("t1", "Strobe", 128.0, Some("Progressive House"));
        source.key = Some("Am".to_string());
        let scorer = MatchScorer::new(EngineParams::default());
        let ranked = scorer.rank(&Catalog::from_sources(vec![source]), &fp);
        let reasons = &ranked[0].reasons;
        assert!(reasons.iter().any(|r| r == "strong BPM match"));
        assert!(reasons.iter().any(|r| r == "key matches chroma peak"));
        assert!(reasons.iter().any(|r| r.contains("electronic")));
    }
}
