//! ONNX Runtime backed segmentation engine.

use crate::engine::{EngineUnavailableError, InferenceError, SegmentationEngine};
use crate::volume::{ClassProbabilityTensor, MultiModalTensor};

use ndarray::Ix5;
use ort::{session::Session, value::Tensor};
use std::path::Path;
use std::sync::Mutex;

pub struct OnnxEngine {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxEngine {
    /// Load a model exported with a single `(1, x, y, z, 4)` input and a
    /// single `(1, x, y, z, classes)` output.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, EngineUnavailableError> {
        let model_path = model_path.as_ref();
        let unavailable = |e: ort::Error| {
            EngineUnavailableError::new(format!(
                "failed to load model {}: {e}",
                model_path.display()
            ))
        };

        log::debug!("Creating ONNX session from {}", model_path.display());
        let session = Session::builder()
            .map_err(unavailable)?
            .commit_from_file(model_path)
            .map_err(unavailable)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| EngineUnavailableError::new("model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| EngineUnavailableError::new("model declares no outputs"))?;
        log::info!(
            "Loaded segmentation model {} (input '{input_name}', output '{output_name}')",
            model_path.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl SegmentationEngine for OnnxEngine {
    fn predict(&self, input: &MultiModalTensor) -> Result<ClassProbabilityTensor, InferenceError> {
        let backend = |e: ort::Error| InferenceError::Backend(e.to_string());

        let input_tensor = Tensor::from_array(input.clone()).map_err(backend)?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Backend("session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => &input_tensor])
            .map_err(backend)?;
        let scores = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(backend)?;

        let actual = scores.shape().to_vec();
        let (_, x, y, z, _) = input.dim();
        scores
            .into_dimensionality::<Ix5>()
            .map(|view| view.to_owned())
            .map_err(|_| InferenceError::OutputShape {
                actual,
                expected: (x, y, z),
            })
    }
}
