use crate::enums::Modality;
use crate::volume::{ModalitySet, MultiModalTensor};

use ndarray::{Array3, Array5, s};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{modality} volume has shape {actual:?}, expected {expected:?}")]
pub struct ShapeMismatchError {
    pub modality: Modality,
    pub expected: (usize, usize, usize),
    pub actual: (usize, usize, usize),
}

/// Assembles resampled modalities into the model input tensor.
#[derive(Debug, Clone)]
pub struct ModalityStacker {
    target_shape: (usize, usize, usize),
}

impl ModalityStacker {
    pub fn new(target_shape: (usize, usize, usize)) -> Self {
        Self { target_shape }
    }

    /// Stack along a trailing channel axis in [`Modality::ALL`] order and
    /// prepend a batch axis of one.
    ///
    /// # Errors
    ///
    /// Returns error if any volume is not exactly the target shape
    pub fn stack(
        &self,
        volumes: &ModalitySet<Array3<f32>>,
    ) -> Result<MultiModalTensor, ShapeMismatchError> {
        for (modality, volume) in volumes.iter() {
            if volume.dim() != self.target_shape {
                return Err(ShapeMismatchError {
                    modality,
                    expected: self.target_shape,
                    actual: volume.dim(),
                });
            }
        }

        let (x, y, z) = self.target_shape;
        let mut tensor = Array5::<f32>::zeros((1, x, y, z, Modality::COUNT));
        for (modality, volume) in volumes.iter() {
            tensor
                .slice_mut(s![0, .., .., .., modality.channel()])
                .assign(volume);
        }
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_set(shape: (usize, usize, usize)) -> ModalitySet<Array3<f32>> {
        ModalitySet::new(
            Array3::from_elem(shape, 0.1),
            Array3::from_elem(shape, 0.2),
            Array3::from_elem(shape, 0.3),
            Array3::from_elem(shape, 0.4),
        )
    }

    #[test]
    fn stacks_in_channel_order_with_batch_axis() {
        let stacker = ModalityStacker::new((3, 4, 5));
        let tensor = stacker.stack(&constant_set((3, 4, 5))).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 4, 5, 4]);
        for (channel, expected) in [0.1f32, 0.2, 0.3, 0.4].into_iter().enumerate() {
            assert!(
                tensor
                    .slice(s![0, .., .., .., channel])
                    .iter()
                    .all(|&v| v == expected)
            );
        }
    }

    #[test]
    fn preserves_voxel_positions() {
        let shape = (2, 3, 4);
        let mut set = constant_set(shape);
        set.flair = Array3::from_shape_fn(shape, |(x, y, z)| (x * 100 + y * 10 + z) as f32);
        let tensor = ModalityStacker::new(shape).stack(&set).unwrap();

        assert_eq!(tensor.slice(s![0, .., .., .., 3]), set.flair);
        assert_eq!(tensor[[0, 1, 2, 3, 3]], 123.0);
    }

    #[test]
    fn rejects_mismatched_volume() {
        let mut set = constant_set((3, 4, 5));
        set.t2 = Array3::zeros((3, 4, 6));
        let err = ModalityStacker::new((3, 4, 5)).stack(&set).unwrap_err();

        assert_eq!(
            err,
            ShapeMismatchError {
                modality: Modality::T2,
                expected: (3, 4, 5),
                actual: (3, 4, 6),
            }
        );
    }
}
