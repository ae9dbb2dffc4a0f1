use serde::Serialize;

use crate::catalog::{Catalog, CatalogSummary, TrackSource};
use crate::config::EngineParams;
use crate::enhancement::{self, Enhancement};
use crate::fingerprint::{FeatureExtractor, FeatureFrame};
use crate::scoring::{MatchCandidate, MatchScorer};
use crate::tracker::MatchTracker;

/// One tick's identification output.
#[derive(Debug)]
pub struct IdentificationResult {
    /// The locked track's candidate for this tick, if locked.
    pub current_track: Option<MatchCandidate>,
    /// Runners-up from the ranked list (excluding the current track).
    pub alternatives: Vec<MatchCandidate>,
    pub is_confident: bool,
    /// Held lock confidence, 0 when unlocked.
    pub confidence_score: f64,
    pub enhancement: Option<Enhancement>,
}

/// Snapshot for status displays.
#[derive(Debug, Serialize)]
pub struct EngineStats {
    pub database_size: usize,
    /// Loader records that failed validation. A load that yields zero usable
    /// tracks is reported here rather than raised as an error.
    pub rejected_tracks: usize,
    pub current_match_name: Option<String>,
    pub confidence: f64,
}

/// Per-tick pipeline (extract → score → track → enhance), synchronous on the
/// caller's thread. Owns all cross-tick state, so instances never interfere.
pub struct IdentificationEngine {
    catalog: Catalog,
    extractor: FeatureExtractor,
    scorer: MatchScorer,
    tracker: MatchTracker,
    params: EngineParams,
    last_match: Option<MatchCandidate>,
}

impl IdentificationEngine {
    pub fn new(params: EngineParams) -> Self {
        Self {
            catalog: Catalog::default(),
            extractor: FeatureExtractor::new(params.history_capacity),
            scorer: MatchScorer::new(params.clone()),
            tracker: MatchTracker::new(params.clone()),
            params,
            last_match: None,
        }
    }

    /// Replace the in-memory catalog. The current lock is kept and resolved
    /// against the new catalog on the next tick.
    pub fn load_database(&mut self, sources: Vec<TrackSource>) -> CatalogSummary {
        self.catalog = Catalog::from_sources(sources);
        let summary = self.catalog.summary();
        log::info!(
            "catalog loaded: {} tracks ({} rejected)",
            summary.loaded,
            summary.rejected
        );
        summary
    }

    /// Run one analysis tick.
    pub fn identify(&mut self, frame: &FeatureFrame) -> IdentificationResult {
        let fingerprint = self.extractor.extract(frame);
        let candidates = self.scorer.rank(&self.catalog, &fingerprint);
        let lock = self.tracker.update(&candidates);

        let current_track = match lock.track() {
            Some(locked) => candidates
                .iter()
                .find(|c| c.track.id == locked.id)
                .cloned()
                // The locked track can miss this tick's list (rule-of-inertia
                // hold while it scores 0); fall back to its last candidate.
                .or_else(|| {
                    self.last_match
                        .as_ref()
                        .filter(|m| m.track.id == locked.id)
                        .cloned()
                }),
            None => None,
        };

        let alternatives: Vec<MatchCandidate> = candidates
            .iter()
            .filter(|c| {
                current_track
                    .as_ref()
                    .is_none_or(|current| c.track.id != current.track.id)
            })
            .take(self.params.max_alternatives)
            .cloned()
            .collect();

        let confidence_score = lock.confidence();
        let result = IdentificationResult {
            is_confident: lock.is_locked() && confidence_score > self.params.confident_threshold,
            confidence_score,
            enhancement: enhancement::generate(lock, frame.level),
            current_track,
            alternatives,
        };
        self.last_match = result.current_track.clone();
        result
    }

    /// Score one frame against the catalog without touching the lock state.
    /// The frame still enters the rolling history.
    pub fn score_frame(&mut self, frame: &FeatureFrame) -> Vec<MatchCandidate> {
        let fingerprint = self.extractor.extract(frame);
        self.scorer.rank(&self.catalog, &fingerprint)
    }

    pub fn current_match(&self) -> Option<&MatchCandidate> {
        self.last_match.as_ref()
    }

    /// Mean fingerprint confidence over the rolling history.
    pub fn mean_input_confidence(&self) -> f64 {
        self.extractor.mean_confidence()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            database_size: self.catalog.len(),
            rejected_tracks: self.catalog.rejected(),
            current_match_name: self
                .tracker
                .state()
                .track()
                .map(|t| format!("{} — {}", t.artist, t.name)),
            confidence: self.tracker.state().confidence(),
        }
    }
}

impl Default for IdentificationEngine {
    fn default() -> Self {
        Self::new(EngineParams::default())
    }
}
