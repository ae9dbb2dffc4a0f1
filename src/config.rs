use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid engine parameters: {0}")]
    Invalid(String),
}

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Default catalog file (used when a command has no --catalog arg).
    pub catalog_path: Option<PathBuf>,
    /// Engine tuning knobs, merged over built-in defaults.
    pub params: EngineParams,
}

impl AppConfig {
    /// Load config from `~/.config/needledrop/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Tunable scoring and lock-tracking parameters.
///
/// The defaults are the reference behavior; a TOML file can override
/// individual knobs for tuning sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Axis weights in the aggregate score. Must sum to 1.
    pub tempo_weight: f64,
    pub spectral_weight: f64,
    pub energy_weight: f64,
    pub key_weight: f64,

    /// Aggregates at or below this are noise and excluded from ranking.
    pub noise_floor: f64,
    /// Minimum best-candidate score to acquire a lock from cold.
    pub acceptance_threshold: f64,
    /// A challenger must beat the held confidence by this much to take the lock.
    pub switch_margin: f64,
    /// Per-tick confidence multiplier while the locked track keeps winning.
    pub reinforcement_factor: f64,
    /// Hard ceiling on lock confidence.
    pub confidence_cap: f64,
    /// Lock confidence above this reports the match as confident.
    pub confident_threshold: f64,

    /// Ranked candidates kept per tick.
    pub max_candidates: usize,
    /// Alternatives reported beside the current match.
    pub max_alternatives: usize,
    /// Fingerprints kept in the rolling history.
    pub history_capacity: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            tempo_weight: 0.35,
            spectral_weight: 0.35,
            energy_weight: 0.20,
            key_weight: 0.10,
            noise_floor: 0.25,
            acceptance_threshold: 0.5,
            switch_margin: 0.1,
            reinforcement_factor: 1.05,
            confidence_cap: 0.98,
            confident_threshold: 0.7,
            max_candidates: 10,
            max_alternatives: 3,
            history_capacity: 16,
        }
    }
}

impl EngineParams {
    /// Load and validate parameters from an explicit TOML file.
    /// Unlike the discovered config file, a broken file here is a hard error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params: EngineParams =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        params.validate()?;
        Ok(params)
    }

    /// Check parameter consistency. The scoring math assumes weights that sum
    /// to 1 and thresholds inside [0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weight_sum =
            self.tempo_weight + self.spectral_weight + self.energy_weight + self.key_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "axis weights must sum to 1.0 (got {weight_sum})"
            )));
        }
        for (name, value) in [
            ("tempo_weight", self.tempo_weight),
            ("spectral_weight", self.spectral_weight),
            ("energy_weight", self.energy_weight),
            ("key_weight", self.key_weight),
            ("noise_floor", self.noise_floor),
            ("acceptance_threshold", self.acceptance_threshold),
            ("confidence_cap", self.confidence_cap),
            ("confident_threshold", self.confident_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in [0, 1] (got {value})"
                )));
            }
        }
        if self.switch_margin < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "switch_margin must be non-negative (got {})",
                self.switch_margin
            )));
        }
        if self.reinforcement_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "reinforcement_factor must be >= 1.0 (got {})",
                self.reinforcement_factor
            )));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_validate() {
        assert!(EngineParams::default().validate().is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let params = EngineParams {
            tempo_weight: 0.5,
            ..EngineParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn thresholds_must_be_fractional() {
        let params = EngineParams {
            acceptance_threshold: 1.5,
            ..EngineParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn decaying_reinforcement_rejected() {
        let params = EngineParams {
            reinforcement_factor: 0.9,
            ..EngineParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_toml_overrides_single_knob() {
        let params: EngineParams = toml::from_str("switch_margin = 0.2").unwrap();
        assert!((params.switch_margin - 0.2).abs() < 1e-12);
        // Everything else stays at the built-in default
        assert!((params.tempo_weight - 0.35).abs() < 1e-12);
        assert!(params.validate().is_ok());
    }
}
