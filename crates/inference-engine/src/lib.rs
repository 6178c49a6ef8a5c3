//! Image Classifier Inference Engine
//!
//! Runs a fixed-input image classifier (224x224x3, one score per label) on a
//! single dedicated worker thread, with an explicit init/run/close lifecycle.
//!
//! - [`LabelTable`]: index-aligned class names
//! - [`TensorPreprocessor`]: RGB grid to normalized NHWC floats
//! - [`InferenceEngine`]: state machine owning the worker and interpreter
//! - [`TopK`]: bounded min-heap ranking of the output vector

mod engine;
pub mod fake;
mod interpreter;
mod labels;
mod preprocess;
mod ranker;
mod tract;
mod worker;

#[cfg(feature = "cuda")]
mod cuda;

pub use engine::{EngineConfig, EngineState, InferenceEngine, InitHandle, Session};
pub use interpreter::{Interpreter, InterpreterFactory, InterpreterOptions};
pub use labels::LabelTable;
pub use preprocess::{TensorPreprocessor, IMAGE_MEAN, IMAGE_STD};
pub use ranker::{rank, RankedLabel, TopK, DEFAULT_TOP_K};
pub use tract::TractInterpreterFactory;

#[cfg(feature = "cuda")]
pub use cuda::CudaInterpreterFactory;

use thiserror::Error;

/// Errors during interpreter lifecycle and inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Interpreter construction failed: {0}")]
    EngineInit(String),
    #[error("Hardware delegate unavailable: {0}")]
    DelegateUnavailable(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Label table has {labels} entries but model produces {outputs} scores")]
    LabelMismatch { labels: usize, outputs: usize },
    #[error("Engine not ready (state: {0})")]
    NotReady(EngineState),
    #[error("Engine closed before initialization completed")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
