//! Accelerated interpreter: onnxruntime with the CUDA execution provider

use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{error, info};

use crate::interpreter::{Interpreter, InterpreterFactory, InterpreterOptions};
use crate::InferenceError;

/// Builds onnxruntime sessions; attaches CUDA when acceleration is requested
#[derive(Debug, Clone)]
pub struct CudaInterpreterFactory {
    input_shape: [usize; 4],
}

impl CudaInterpreterFactory {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_shape: [1, input_size as usize, input_size as usize, 3],
        }
    }

    fn session(&self, model: &[u8], use_accel: bool) -> Result<Session, InferenceError> {
        let mut builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(|e| InferenceError::EngineInit(e.to_string()))?;

        if use_accel {
            // error_on_failure: registration failure must not degrade to CPU
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
                .map_err(|e| {
                    error!("Failed to attach CUDA execution provider: {}", e);
                    InferenceError::DelegateUnavailable(e.to_string())
                })?;
        }

        builder
            .commit_from_memory(model)
            .map_err(|e| InferenceError::EngineInit(e.to_string()))
    }
}

impl Default for CudaInterpreterFactory {
    fn default() -> Self {
        Self::new(224)
    }
}

impl InterpreterFactory for CudaInterpreterFactory {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn create(&self, model: &[u8], options: InterpreterOptions) -> Result<Box<dyn Interpreter>, InferenceError> {
        let session = self.session(model, options.use_accel)?;
        let output_len = session_output_width(&session)?;
        info!(
            "onnxruntime interpreter ready (accelerated: {}), {} outputs",
            options.use_accel, output_len
        );
        Ok(Box::new(OrtInterpreter {
            session,
            input_shape: self.input_shape,
            output_len,
        }))
    }

    fn output_width(&self, model: &[u8]) -> Result<usize, InferenceError> {
        session_output_width(&self.session(model, false)?)
    }
}

fn session_output_width(session: &Session) -> Result<usize, InferenceError> {
    session
        .outputs
        .first()
        .and_then(|o| o.output_type.tensor_dimensions())
        .and_then(|dims| dims.last().copied())
        .filter(|&d| d > 0)
        .map(|d| d as usize)
        .ok_or_else(|| InferenceError::EngineInit("model output width is unknown".into()))
}

struct OrtInterpreter {
    session: Session,
    input_shape: [usize; 4],
    output_len: usize,
}

impl Interpreter for OrtInterpreter {
    fn output_len(&self) -> usize {
        self.output_len
    }

    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), InferenceError> {
        let failed = |e: ort::Error| InferenceError::InferenceFailed(e.to_string());

        let tensor = Tensor::from_array((self.input_shape, input.to_vec())).map_err(failed)?;
        let outputs = self.session.run(ort::inputs![tensor].map_err(failed)?).map_err(failed)?;
        let (_, scores) = outputs[0].try_extract_raw_tensor::<f32>().map_err(failed)?;

        if scores.len() != output.len() {
            return Err(InferenceError::InvalidInputShape {
                expected: output.len().to_string(),
                actual: scores.len().to_string(),
            });
        }
        output.copy_from_slice(scores);
        Ok(())
    }
}
