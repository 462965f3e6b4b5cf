//! End-to-end prediction for one request.

use crate::config::PipelineConfig;
use crate::engine::{EngineHandle, EngineUnavailableError, InferenceError};
use crate::enums::Modality;
use crate::interpolator::Interpolator;
use crate::normalizer::IntensityNormalizer;
use crate::stacker::{ModalityStacker, ShapeMismatchError};
use crate::statistics::{RegionStatistics, SegmentationStatistics};
use crate::volume::{ClassProbabilityTensor, ModalitySet, MultiModalTensor};
use crate::volume_loader::{DecodeError, VolumeLoader};

use ndarray::{Array3, Axis};
use thiserror::Error;

/// Raw container bytes for the four modalities of one request.
pub type ModalityInputs = ModalitySet<Vec<u8>>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode {modality} volume: {source}")]
    Decode {
        modality: Modality,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error(transparent)]
    EngineUnavailable(#[from] EngineUnavailableError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Segmentation and statistics of one request.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Class id per voxel, indexed `[x, y, z]` on the target grid.
    pub segmentation: Array3<u32>,
    pub statistics: SegmentationStatistics,
}

impl Prediction {
    pub fn shape(&self) -> (usize, usize, usize) {
        self.segmentation.dim()
    }

    /// Class ids in row-major order.
    pub fn flattened(&self) -> Vec<u32> {
        RegionStatistics::flatten(&self.segmentation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: IntensityNormalizer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            normalizer: IntensityNormalizer::new(config.normalization),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode, normalize and resample one modality.
    pub fn prepare_modality(
        &self,
        modality: Modality,
        bytes: &[u8],
    ) -> Result<Array3<f32>, PipelineError> {
        let volume = VolumeLoader::load_from_bytes(bytes)
            .map_err(|source| PipelineError::Decode { modality, source })?;
        let normalized = self.normalizer.normalize(&volume.data().view());
        Ok(Interpolator::resample_nearest(
            &normalized.view(),
            self.config.target_shape,
        ))
    }

    /// Build the model input tensor. Modalities are prepared in parallel.
    pub fn preprocess(&self, inputs: &ModalityInputs) -> Result<MultiModalTensor, PipelineError> {
        let resampled =
            inputs.par_try_map(|modality, bytes| self.prepare_modality(modality, bytes))?;
        let stacker = ModalityStacker::new(self.config.target_shape);
        Ok(stacker.stack(&resampled)?)
    }

    /// Run the full request: engine availability, preprocessing, inference,
    /// statistics. No partial result is produced on any failure.
    pub fn predict(
        &self,
        inputs: &ModalityInputs,
        engine: &EngineHandle,
    ) -> Result<Prediction, PipelineError> {
        let engine = engine.get()?;
        let tensor = self.preprocess(inputs)?;
        let scores = engine.predict(&tensor)?;
        self.postprocess(&scores)
    }

    /// Reduce engine scores to a segmentation map and statistics.
    pub fn postprocess(&self, scores: &ClassProbabilityTensor) -> Result<Prediction, PipelineError> {
        let (x, y, z) = self.config.target_shape;
        let shape = scores.shape();
        if shape[..4] != [1, x, y, z] || shape[4] == 0 {
            return Err(InferenceError::OutputShape {
                actual: shape.to_vec(),
                expected: self.config.target_shape,
            }
            .into());
        }

        let segmentation = RegionStatistics::segment(&scores.index_axis(Axis(0), 0));
        let statistics = RegionStatistics::summarize(&segmentation);
        Ok(Prediction {
            segmentation,
            statistics,
        })
    }
}
