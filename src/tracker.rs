//! Hysteresis lock on the current-track hypothesis.
//!
//! Acquire above the acceptance threshold, reinforce `×1.05` (capped) on an
//! identity match, switch only when a challenger beats held confidence by the
//! margin, release on an empty candidate list.

use std::sync::Arc;

use crate::catalog::TrackRecord;
use crate::config::EngineParams;
use crate::scoring::MatchCandidate;

/// The engine's committed current-track hypothesis.
#[derive(Debug, Clone, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    Locked {
        track: Arc<TrackRecord>,
        confidence: f64,
    },
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// Held confidence, 0 when unlocked.
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Unlocked => 0.0,
            Self::Locked { confidence, .. } => *confidence,
        }
    }

    pub fn track(&self) -> Option<&Arc<TrackRecord>> {
        match self {
            Self::Unlocked => None,
            Self::Locked { track, .. } => Some(track),
        }
    }
}

#[derive(Debug)]
pub struct MatchTracker {
    state: LockState,
    params: EngineParams,
}

impl MatchTracker {
    pub fn new(params: EngineParams) -> Self {
        Self {
            state: LockState::Unlocked,
            params,
        }
    }

    pub fn state(&self) -> &LockState {
        &self.state
    }

    /// Advance the state machine one tick from the ranked candidates.
    ///
    /// Reinforcement on an identity match is unconditional — even a tick
    /// whose own score is weak raises the held confidence, because the
    /// switch margin alone decides displacement.
    pub fn update(&mut self, candidates: &[MatchCandidate]) -> &LockState {
        let Some(best) = candidates.first() else {
            if self.state.is_locked() {
                log::debug!("lock released: no candidates this tick");
            }
            self.state = LockState::Unlocked;
            return &self.state;
        };

        self.state = match &self.state {
            LockState::Unlocked => {
                if best.overall > self.params.acceptance_threshold {
                    log::debug!(
                        "lock acquired: {} — {} ({:.2})",
                        best.track.artist,
                        best.track.name,
                        best.overall
                    );
                    LockState::Locked {
                        track: Arc::clone(&best.track),
                        confidence: best.overall.min(self.params.confidence_cap),
                    }
                } else {
                    LockState::Unlocked
                }
            }
            LockState::Locked { track, confidence } => {
                if best.track.id == track.id {
                    let reinforced = (confidence * self.params.reinforcement_factor)
                        .min(self.params.confidence_cap);
                    LockState::Locked {
                        track: Arc::clone(track),
                        confidence: reinforced,
                    }
                } else if best.overall > confidence + self.params.switch_margin {
                    log::debug!(
                        "lock switched: {} -> {} ({:.2} beats held {:.2})",
                        track.name,
                        best.track.name,
                        best.overall,
                        confidence
                    );
                    LockState::Locked {
                        track: Arc::clone(&best.track),
                        confidence: best.overall.min(self.params.confidence_cap),
                    }
                } else {
                    // Inertia: challenger inside the margin, hold the lock.
                    LockState::Locked {
                        track: Arc::clone(track),
                        confidence: *confidence,
                    }
                }
            }
        };
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TrackRecord;

    fn track(id: &str) -> Arc<TrackRecord> {
        Arc::new(TrackRecord {
            id: id.to_string(),
            name: format!("Track {id}"),
            artist: "Artist".to_string(),
            bpm: 128.0,
            key: None,
            genre: None,
            duration_secs: 240.0,
            energy: None,
            structure: None,
        })
    }

    fn candidate(track: &Arc<TrackRecord>, overall: f64) -> MatchCandidate {
        MatchCandidate {
            track: Arc::clone(track),
            tempo_score: 0.0,
            key_score: 0.0,
            energy_score: 0.0,
            spectral_score: 0.0,
            overall,
            time_offset_secs: 0.0,
            reasons: Vec::new(),
        }
    }

    fn tracker() -> MatchTracker {
        MatchTracker::new(EngineParams::default())
    }

    #[test]
    fn no_candidates_releases_the_lock() {
        let mut tracker = tracker();
        let a = track("a");
        tracker.update(&[candidate(&a, 0.8)]);
        assert!(tracker.state().is_locked());
        tracker.update(&[]);
        assert!(!tracker.state().is_locked());
        assert_eq!(tracker.state().confidence(), 0.0);
    }

    #[test]
    fn acquisition_requires_exceeding_the_threshold() {
        let mut tracker = tracker();
        let a = track("a");
        tracker.update(&[candidate(&a, 0.5)]); // not strictly above
        assert!(!tracker.state().is_locked());
        tracker.update(&[candidate(&a, 0.51)]);
        assert!(tracker.state().is_locked());
        assert!((tracker.state().confidence() - 0.51).abs() < 1e-12);
    }

    #[test]
    fn first_candidate_over_threshold_wins_between_two() {
        let mut tracker = tracker();
        let a = track("a");
        let b = track("b");
        tracker.update(&[candidate(&a, 0.6), candidate(&b, 0.55)]);
        assert_eq!(tracker.state().track().unwrap().id, "a");
        assert!((tracker.state().confidence() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn reinforcement_compounds_and_caps() {
        let mut tracker = tracker();
        let a = track("a");
        tracker.update(&[candidate(&a, 0.6)]);
        let mut previous = 0.6;
        for _ in 0..60 {
            tracker.update(&[candidate(&a, 0.6)]);
            let current = tracker.state().confidence();
            assert!(current >= previous);
            previous = current;
        }
        assert!((previous - 0.98).abs() < 1e-12);
    }

    #[test]
    fn reinforcement_ignores_a_weak_tick_score() {
        // Identity match reinforces even when this tick's own score is poor.
        let mut tracker = tracker();
        let a = track("a");
        tracker.update(&[candidate(&a, 0.8)]);
        tracker.update(&[candidate(&a, 0.3)]);
        assert!((tracker.state().confidence() - 0.8 * 1.05).abs() < 1e-12);
    }

    #[test]
    fn challenger_inside_the_margin_is_ignored() {
        let mut tracker = tracker();
        let a = track("a");
        let b = track("b");
        tracker.update(&[candidate(&a, 0.6)]);
        // 0.7 == held 0.6 + margin 0.1: not strictly above, no switch
        tracker.update(&[candidate(&b, 0.7), candidate(&a, 0.55)]);
        assert_eq!(tracker.state().track().unwrap().id, "a");
        assert!((tracker.state().confidence() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn challenger_clearing_the_margin_takes_the_lock() {
        let mut tracker = tracker();
        let a = track("a");
        let b = track("b");
        tracker.update(&[candidate(&a, 0.6)]);
        tracker.update(&[candidate(&b, 0.71), candidate(&a, 0.55)]);
        assert_eq!(tracker.state().track().unwrap().id, "b");
        assert!((tracker.state().confidence() - 0.71).abs() < 1e-12);
    }

    #[test]
    fn sub_threshold_ticks_leave_unlocked_state_alone() {
        let mut tracker = tracker();
        let a = track("a");
        tracker.update(&[candidate(&a, 0.2)]);
        tracker.update(&[candidate(&a, 0.4)]);
        assert!(!tracker.state().is_locked());
    }
}
