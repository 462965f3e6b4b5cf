//! Pipeline configuration.
//!
//! Defaults reproduce the canonicalization the segmentation model was trained
//! against. Individual thresholds can be overridden from the environment.

use crate::volume::TARGET_SHAPE;

use thiserror::Error;

pub const ENV_LOWER_PERCENTILE: &str = "TUMOR_VOLUME_LOWER_PERCENTILE";
pub const ENV_UPPER_PERCENTILE: &str = "TUMOR_VOLUME_UPPER_PERCENTILE";
pub const ENV_NOISE_FLOOR: &str = "TUMOR_VOLUME_NOISE_FLOOR";
/// Path of the segmentation model, read by the binary.
pub const ENV_MODEL: &str = "TUMOR_VOLUME_MODEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a number")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key}={value} is outside [0, 1]")]
    OutOfRange { key: &'static str, value: f64 },

    #[error("lower percentile {lower} exceeds upper percentile {upper}")]
    InvertedPercentiles { lower: f64, upper: f64 },
}

/// Intensity normalization parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationConfig {
    /// Rank (as a fraction of the voxel count) of the lower clipping bound.
    pub lower_percentile: f64,
    /// Rank of the upper clipping bound.
    pub upper_percentile: f64,
    /// Smallest intensity range used as the rescale divisor.
    pub min_range: f64,
    /// Rescaled values strictly below this are set to zero.
    pub noise_floor: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            lower_percentile: 0.01,
            upper_percentile: 0.99,
            min_range: 1e-6,
            noise_floor: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub target_shape: (usize, usize, usize),
    pub normalization: NormalizationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_shape: TARGET_SHAPE,
            normalization: NormalizationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with overrides from `TUMOR_VOLUME_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = NormalizationConfig::default();
        let read = |key: &'static str, default: f64| -> Result<f64, ConfigError> {
            let Some(raw) = lookup(key) else {
                return Ok(default);
            };
            let value = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    key,
                    value: raw.clone(),
                })?;
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { key, value });
            }
            Ok(value)
        };

        let normalization = NormalizationConfig {
            lower_percentile: read(ENV_LOWER_PERCENTILE, defaults.lower_percentile)?,
            upper_percentile: read(ENV_UPPER_PERCENTILE, defaults.upper_percentile)?,
            noise_floor: read(ENV_NOISE_FLOOR, defaults.noise_floor)?,
            ..defaults
        };
        if normalization.lower_percentile > normalization.upper_percentile {
            return Err(ConfigError::InvertedPercentiles {
                lower: normalization.lower_percentile,
                upper: normalization.upper_percentile,
            });
        }

        Ok(Self {
            normalization,
            ..Self::default()
        })
    }
}
