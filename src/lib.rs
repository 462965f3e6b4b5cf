//! # tumor-volume library
//!
//! This crate turns the four MRI modalities of a brain scan (T1, T1ce, T2
//! and FLAIR) into a voxel-wise tumor segmentation with summary statistics.
//!
//! Each modality arrives as a NIfTI-1 or NIfTI-2 container, optionally
//! gzip-compressed. The pipeline decodes every modality, normalizes its
//! intensities (percentile clipping, min-max rescaling and a noise floor),
//! resamples it with nearest-neighbor interpolation onto a fixed
//! 128 × 128 × 96 grid and stacks the four volumes into a single
//! `(1, 128, 128, 96, 4)` tensor. The four modality chains run in parallel
//! using rayon.
//!
//! The tensor is handed to a [`SegmentationEngine`], which returns per-voxel
//! class scores. These are reduced by arg-max to a segmentation map and
//! counted into tumor regions:
//!  - NCR/NET (class 1)
//!  - Edema (class 2)
//!  - Enhancing Tumor (class 3)
//!
//! The engine is loaded once per process through an [`EngineHandle`]. With
//! the `onnx` feature enabled, `OnnxEngine` runs an exported model with
//! ONNX Runtime.
//!
//! # Examples
//!
//! ## Segmenting a scan
//!
//! ```no_run
//! # use tumor_volume::{EngineHandle, ModalitySet, Pipeline, PredictionResponse};
//! # use tumor_volume::engine::{EngineUnavailableError, SegmentationEngine};
//! # use std::sync::Arc;
//! # fn load_model() -> Result<Arc<dyn SegmentationEngine>, EngineUnavailableError> { todo!() }
//! let read = |path: &str| std::fs::read(path).expect("should have read modality");
//! let inputs = ModalitySet::new(
//!     read("t1.nii.gz"),
//!     read("t1ce.nii.gz"),
//!     read("t2.nii.gz"),
//!     read("flair.nii.gz"),
//! );
//! let engine = EngineHandle::new(load_model);
//! let prediction = Pipeline::default()
//!     .predict(&inputs, &engine)
//!     .expect("should have segmented the scan");
//! println!("{} tumor voxels", prediction.statistics.tumor_voxels);
//! let response = PredictionResponse::new(prediction, chrono::Utc::now());
//! ```

pub mod config;
pub mod engine;
pub mod enums;
pub mod header;
pub mod interpolator;
pub mod normalizer;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod response;
pub mod stacker;
pub mod statistics;
#[cfg(test)]
mod testing;
pub mod volume;
pub mod volume_loader;

pub use config::{NormalizationConfig, PipelineConfig};
pub use engine::{EngineHandle, SegmentationEngine};
pub use enums::{Modality, TumorClass};
pub use pipeline::{Pipeline, PipelineError, Prediction};
pub use response::{ErrorResponse, PredictionResponse, ServiceStatus};
pub use volume::{ModalitySet, TARGET_SHAPE};
