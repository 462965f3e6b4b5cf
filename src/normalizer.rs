use crate::config::NormalizationConfig;

use ndarray::{Array3, ArrayView3, Zip};

/// Percentile clipping and min-max rescaling of a single volume.
///
/// Each modality is normalized on its own: intensities are clipped to the
/// `[lower, upper]` order statistics, rescaled to `[0, 1]`, and every value
/// below the noise floor is then forced to zero. Non-finite intensities are
/// excluded from the order statistics and map to zero.
#[derive(Debug, Clone, Default)]
pub struct IntensityNormalizer {
    config: NormalizationConfig,
}

impl IntensityNormalizer {
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    pub fn normalize(&self, volume: &ArrayView3<'_, f64>) -> Array3<f32> {
        let Some((low, high)) = self.percentile_bounds(volume) else {
            return Array3::zeros(volume.raw_dim());
        };

        let mut range = high - low;
        if range < self.config.min_range {
            range = self.config.min_range;
        }
        let noise_floor = self.config.noise_floor;

        Zip::from(volume).par_map_collect(|&value| {
            if !value.is_finite() {
                return 0.0;
            }
            let scaled = (value.clamp(low, high) - low) / range;
            if scaled < noise_floor {
                0.0
            } else {
                scaled as f32
            }
        })
    }

    /// Values at ranks `floor(lower * N)` and `floor(upper * N)` of the
    /// sorted finite intensities, or `None` when there are none.
    pub fn percentile_bounds(&self, volume: &ArrayView3<'_, f64>) -> Option<(f64, f64)> {
        let mut values: Vec<f64> = volume.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }

        let last = values.len() - 1;
        let rank = |fraction: f64| ((values.len() as f64 * fraction) as usize).min(last);
        let upper_rank = rank(self.config.upper_percentile);
        let lower_rank = rank(self.config.lower_percentile).min(upper_rank);

        let (below, &mut high, _) = values.select_nth_unstable_by(upper_rank, f64::total_cmp);
        let low = if lower_rank == upper_rank {
            high
        } else {
            *below.select_nth_unstable_by(lower_rank, f64::total_cmp).1
        };
        Some((low, high))
    }
}
