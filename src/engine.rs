//! Segmentation engine seam and the process-wide engine handle.

use crate::volume::{ClassProbabilityTensor, MultiModalTensor};

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("forward pass failed: {0}")]
    Backend(String),

    #[error("engine returned scores of shape {actual:?}, expected (1, {}, {}, {}, classes)", .expected.0, .expected.1, .expected.2)]
    OutputShape {
        actual: Vec<usize>,
        expected: (usize, usize, usize),
    },
}

#[derive(Debug, Clone, Error)]
#[error("segmentation engine unavailable: {reason}")]
pub struct EngineUnavailableError {
    pub reason: String,
}

impl EngineUnavailableError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A loaded segmentation model.
///
/// Input is `(1, x, y, z, 4)` single precision in `[0, 1]`; output is
/// `(1, x, y, z, classes)` relative scores. Implementations must be
/// deterministic for a fixed input.
pub trait SegmentationEngine: Send + Sync {
    fn predict(&self, input: &MultiModalTensor) -> Result<ClassProbabilityTensor, InferenceError>;
}

type LoadFn =
    dyn Fn() -> Result<Arc<dyn SegmentationEngine>, EngineUnavailableError> + Send + Sync;

/// Lazily loaded engine shared by every request of the process.
///
/// The loader runs at most once at a time; concurrent callers wait for the
/// in-flight load and then see the loaded engine. A failed load leaves the
/// handle empty so the next caller tries again.
pub struct EngineHandle {
    engine: OnceCell<Arc<dyn SegmentationEngine>>,
    loader: Box<LoadFn>,
}

impl EngineHandle {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SegmentationEngine>, EngineUnavailableError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            engine: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Handle around an engine that is already loaded.
    pub fn preloaded(engine: Arc<dyn SegmentationEngine>) -> Self {
        Self {
            engine: OnceCell::with_value(engine),
            loader: Box::new(|| Err(EngineUnavailableError::new("engine was preloaded"))),
        }
    }

    /// The loaded engine, loading it first if needed.
    pub fn get(&self) -> Result<&dyn SegmentationEngine, EngineUnavailableError> {
        self.engine
            .get_or_try_init(|| (self.loader)())
            .map(|engine| &**engine)
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.get().is_some()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
