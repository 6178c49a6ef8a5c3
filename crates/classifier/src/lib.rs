//! Live Frame Classifier
//!
//! Camera frame in, top-K labels out:
//! raw YUV frame -> RGB crop/scale -> normalized tensor -> interpreter -> top-K -> listener.
//!
//! The [`PipelineController`] is the only entry point the producer and the UI
//! need: `init`/`close` on visibility changes, `submit`/`analyze` per frame.

pub mod assets;
pub mod config;
pub mod controller;
pub mod listener;
pub mod report;

pub use assets::ModelAssets;
pub use config::ClassifierConfig;
pub use controller::{PipelineController, Submission};
pub use listener::{FnListener, ResultListener};
pub use report::Recognition;

use std::path::PathBuf;
use std::sync::Arc;

use frame_convert::FrameError;
use inference_engine::{InferenceError, InterpreterFactory};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Install the global tracing subscriber
pub fn init_logging(level: &str, json: bool) -> Result<(), PipelineError> {
    let level: Level = level
        .parse()
        .map_err(|_| PipelineError::Config(format!("unknown log level `{}`", level)))?;

    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| PipelineError::Logging(e.to_string()))
}

/// Interpreter backend for this build: onnxruntime with the `cuda` feature, tract otherwise
pub fn interpreter_factory(config: &ClassifierConfig) -> Arc<dyn InterpreterFactory> {
    #[cfg(feature = "cuda")]
    {
        Arc::new(inference_engine::CudaInterpreterFactory::new(config.input_size))
    }
    #[cfg(not(feature = "cuda"))]
    {
        Arc::new(inference_engine::TractInterpreterFactory::new(config.input_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_log_level() {
        assert!(matches!(init_logging("loud", false), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_default_backend() {
        let factory = interpreter_factory(&ClassifierConfig::default());
        #[cfg(not(feature = "cuda"))]
        assert_eq!(factory.name(), "tract");
        #[cfg(feature = "cuda")]
        assert_eq!(factory.name(), "onnxruntime");
    }
}
