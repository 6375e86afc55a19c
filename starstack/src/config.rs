use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_proc::detection::DetectionParams;
use crate::matcher::MatchParams;
pub use stack_math::EdgePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the pipeline does when a non-reference frame cannot be aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the frame as excluded and continue
    #[default]
    Exclude,
    /// Stop the run with an error
    Abort,
}

/// Configuration for a stacking run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Frames discarded from the start of the input before the window
    pub skip: usize,
    /// Number of frames in the stacking window
    pub nframes: usize,
    /// Register frames on the reference catalog. When `false` frames are
    /// stacked unshifted and no detection or matching runs.
    pub align: bool,
    /// Point-source FWHM in pixels
    pub fwhm: f64,
    /// Detection threshold in background standard deviations
    pub threshold_sigma: f64,
    /// Largest tracker pair distance considered by the matcher (pixels)
    pub dmax: f64,
    /// Matcher vote histogram cell width (pixels)
    pub bin_size: f64,
    /// Refinement accepts pairs within `residual_factor * fwhm` of the coarse offset
    pub residual_factor: f64,
    /// Pixels trimmed from every edge before processing
    pub border: usize,
    /// Brightest sources per catalog used for matching
    pub num_trackers: usize,
    /// Fill for samples shifted in from outside the frame
    pub edge_policy: EdgePolicy,
    pub on_frame_failure: FailurePolicy,
    /// Cap on worker threads; `None` uses the global rayon pool
    pub max_threads: Option<usize>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            skip: 0,
            nframes: 5,
            align: true,
            fwhm: 3.0,
            threshold_sigma: 5.0,
            dmax: 50.0,
            bin_size: 0.5,
            residual_factor: 0.5,
            border: 0,
            num_trackers: 10,
            edge_policy: EdgePolicy::Clamp,
            on_frame_failure: FailurePolicy::Exclude,
            max_threads: None,
        }
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}

impl StackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("fwhm", self.fwhm)?;
        require_positive("threshold_sigma", self.threshold_sigma)?;
        require_positive("dmax", self.dmax)?;
        require_positive("bin_size", self.bin_size)?;
        require_positive("residual_factor", self.residual_factor)?;

        if self.nframes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "nframes",
                reason: "at least one frame is required".to_string(),
            });
        }
        if self.num_trackers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "num_trackers",
                reason: "at least one tracker is required".to_string(),
            });
        }
        if self.max_threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_threads",
                reason: "thread cap must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            fwhm: self.fwhm,
            threshold_sigma: self.threshold_sigma,
        }
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams {
            dmax: self.dmax,
            bin_size: self.bin_size,
            fwhm: self.fwhm,
            residual_factor: self.residual_factor,
        }
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file. Missing fields take their defaults; the result is validated.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: StackConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StackConfig::default();
        config.validate().unwrap();
        assert_eq!(config.nframes, 5);
        assert_eq!(config.num_trackers, 10);
        assert_eq!(config.dmax, 50.0);
        assert_eq!(config.bin_size, 0.5);
        assert!(config.align);
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let cases: Vec<(&str, StackConfig)> = vec![
            ("fwhm", StackConfig { fwhm: 0.0, ..Default::default() }),
            ("bin_size", StackConfig { bin_size: -0.5, ..Default::default() }),
            ("dmax", StackConfig { dmax: f64::NAN, ..Default::default() }),
            ("nframes", StackConfig { nframes: 0, ..Default::default() }),
            ("num_trackers", StackConfig { num_trackers: 0, ..Default::default() }),
            ("max_threads", StackConfig { max_threads: Some(0), ..Default::default() }),
        ];

        for (expected, config) in cases {
            match config.validate() {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: expected InvalidValue, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StackConfig =
            serde_json::from_str(r#"{"nframes": 12, "align": false, "edge_policy": "zero", "on_frame_failure": "abort"}"#)
                .unwrap();

        assert_eq!(config.nframes, 12);
        assert!(!config.align);
        assert_eq!(config.edge_policy, EdgePolicy::Zero);
        assert_eq!(config.on_frame_failure, FailurePolicy::Abort);
        assert_eq!(config.fwhm, 3.0);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("starstack_config_{}.json", std::process::id()));
        let config = StackConfig {
            skip: 2,
            border: 16,
            max_threads: Some(3),
            ..Default::default()
        };

        config.save_to_file(&path).unwrap();
        let loaded = StackConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_file_contents() {
        let path = std::env::temp_dir().join(format!("starstack_bad_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"fwhm": -1.0}"#).unwrap();
        let result = StackConfig::load_from_file(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "fwhm", .. })));
    }

    #[test]
    fn test_params_mirror_config() {
        let config = StackConfig {
            fwhm: 4.0,
            dmax: 12.0,
            ..Default::default()
        };
        assert_eq!(config.detection_params().fwhm, 4.0);
        assert_eq!(config.match_params().dmax, 12.0);
        assert_eq!(config.match_params().tolerance(), 2.0);
    }
}
