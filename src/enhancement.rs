use serde::Serialize;

use crate::catalog::TrackRecord;
use crate::tracker::LockState;

/// Derived playback estimates for the locked track.
#[derive(Debug, Clone, Serialize)]
pub struct Enhancement {
    pub predicted_bpm: f64,
    pub predicted_key: Option<String>,
    pub predicted_genre: Option<String>,
    /// Overall energy from the track's metadata (0-10 scale), if present.
    pub predicted_energy: Option<f64>,
    /// intro / verse / chorus / outro, or "unknown" without structure
    /// metadata.
    pub song_section: &'static str,
    pub time_in_track_secs: f64,
    pub time_remaining_secs: f64,
}

/// Level-bucket playback-position proxy: <0.3 reads as ~5% into the track,
/// >0.7 as ~40% (chorus territory), anything between as ~30%.
pub fn estimate_time_offset(level: f64, duration_secs: f64) -> f64 {
    let ratio = if level < 0.3 {
        0.05
    } else if level > 0.7 {
        0.40
    } else {
        0.30
    };
    ratio * duration_secs
}

/// Section label from how far into the track the estimate lands. Requires
/// structural metadata on the track; without it the section stays unknown.
fn song_section(track: &TrackRecord, offset_secs: f64) -> &'static str {
    if track.structure.is_none() {
        return "unknown";
    }
    let ratio = if track.duration_secs > 0.0 {
        offset_secs / track.duration_secs
    } else {
        0.0
    };
    if ratio < 0.1 {
        "intro"
    } else if ratio > 0.9 {
        "outro"
    } else if (0.3..=0.5).contains(&ratio) || (0.7..=0.9).contains(&ratio) {
        "chorus"
    } else {
        "verse"
    }
}

/// Build the enhancement for the current lock, if any.
pub fn generate(lock: &LockState, level: f64) -> Option<Enhancement> {
    let LockState::Locked { track, .. } = lock else {
        return None;
    };
    let offset = estimate_time_offset(level, track.duration_secs);
    Some(Enhancement {
        predicted_bpm: track.bpm,
        predicted_key: track.key.clone(),
        predicted_genre: track.genre.clone(),
        predicted_energy: track.energy.as_ref().map(|e| e.overall),
        song_section: song_section(track, offset),
        time_in_track_secs: offset,
        time_remaining_secs: (track.duration_secs - offset).max(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EnergySummary, SongStructure};
    use std::sync::Arc;

    fn locked_track(structure: Option<SongStructure>) -> LockState {
        LockState::Locked {
            track: Arc::new(TrackRecord {
                id: "t1".to_string(),
                name: "Strobe".to_string(),
                artist: "deadmau5".to_string(),
                bpm: 128.0,
                key: Some("Am".to_string()),
                genre: Some("Progressive House".to_string()),
                duration_secs: 600.0,
                energy: Some(EnergySummary {
                    overall: 7.0,
                    intro: None,
                    verse: None,
                    chorus: None,
                    outro: None,
                }),
                structure,
            }),
            confidence: 0.9,
        }
    }

    #[test]
    fn unlocked_state_yields_nothing() {
        assert!(generate(&LockState::Unlocked, 0.5).is_none());
    }

    #[test]
    fn level_buckets_map_to_offsets() {
        assert!((estimate_time_offset(0.1, 600.0) - 30.0).abs() < 1e-9);
        assert!((estimate_time_offset(0.5, 600.0) - 180.0).abs() < 1e-9);
        assert!((estimate_time_offset(0.9, 600.0) - 240.0).abs() < 1e-9);
        // Bucket edges belong to the middle bucket
        assert!((estimate_time_offset(0.3, 600.0) - 180.0).abs() < 1e-9);
        assert!((estimate_time_offset(0.7, 600.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn sections_follow_the_offset_ratio() {
        let lock = locked_track(Some(SongStructure::default()));
        // level 0.1 -> 5% -> intro
        assert_eq!(generate(&lock, 0.1).unwrap().song_section, "intro");
        // level 0.9 -> 40% -> chorus
        assert_eq!(generate(&lock, 0.9).unwrap().song_section, "chorus");
        // level 0.5 -> 30% -> chorus window starts at 0.3
        assert_eq!(generate(&lock, 0.5).unwrap().song_section, "chorus");
    }

    #[test]
    fn missing_structure_metadata_reads_unknown() {
        let lock = locked_track(None);
        assert_eq!(generate(&lock, 0.9).unwrap().song_section, "unknown");
    }

    #[test]
    fn predictions_come_from_the_locked_track() {
        let lock = locked_track(None);
        let enhancement = generate(&lock, 0.5).unwrap();
        assert!((enhancement.predicted_bpm - 128.0).abs() < 1e-12);
        assert_eq!(enhancement.predicted_key.as_deref(), Some("Am"));
        assert_eq!(enhancement.predicted_genre.as_deref(), Some("Progressive House"));
        assert!((enhancement.predicted_energy.unwrap() - 7.0).abs() < 1e-12);
        assert!((enhancement.time_in_track_secs - 180.0).abs() < 1e-9);
        assert!((enhancement.time_remaining_secs - 420.0).abs() < 1e-9);
    }
}
