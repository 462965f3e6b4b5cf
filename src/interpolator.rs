use ndarray::{Array3, ArrayView3, Axis};
use rayon::prelude::*;

/// Nearest-neighbor resampling onto a fixed grid.
pub struct Interpolator;

impl Interpolator {
    /// Source index sampled by every output index along one axis.
    ///
    /// End points of the source and target grids are aligned and the
    /// coordinate is rounded half up, then clamped into the source.
    pub(crate) fn nearest_source_indices(source_len: usize, target_len: usize) -> Vec<usize> {
        let step = if target_len > 1 {
            (source_len as f64 - 1.0) / (target_len as f64 - 1.0)
        } else {
            1.0
        };
        let last = source_len.saturating_sub(1);

        (0..target_len)
            .map(|k| {
                let coordinate = (k as f64 * step + 0.5).floor();
                (coordinate.max(0.0) as usize).min(last)
            })
            .collect()
    }

    /// Resample `volume` to exactly `target`, introducing no new values.
    pub fn resample_nearest(
        volume: &ArrayView3<'_, f32>,
        target: (usize, usize, usize),
    ) -> Array3<f32> {
        let (source_x, source_y, source_z) = volume.dim();
        let x_index = Self::nearest_source_indices(source_x, target.0);
        let y_index = Self::nearest_source_indices(source_y, target.1);
        let z_index = Self::nearest_source_indices(source_z, target.2);

        let mut resampled = Array3::<f32>::zeros(target);
        resampled
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(x_index.par_iter())
            .for_each(|(mut plane, &src_x)| {
                for (j, &src_y) in y_index.iter().enumerate() {
                    for (k, &src_z) in z_index.iter().enumerate() {
                        plane[[j, k]] = volume[[src_x, src_y, src_z]];
                    }
                }
            });

        resampled
    }
}
