//! CPU interpreter backed by tract-onnx

use std::io::Cursor;

use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::interpreter::{Interpreter, InterpreterFactory, InterpreterOptions};
use crate::InferenceError;

/// Builds tract plans for an ONNX classifier with a fixed NHWC input
#[derive(Debug, Clone)]
pub struct TractInterpreterFactory {
    input_shape: [usize; 4],
}

impl TractInterpreterFactory {
    /// Factory for a `1 x size x size x 3` input
    pub fn new(input_size: u32) -> Self {
        Self {
            input_shape: [1, input_size as usize, input_size as usize, 3],
        }
    }

    fn optimized(&self, model: &[u8]) -> Result<TypedModel, InferenceError> {
        tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(model))
            .and_then(|m| m.with_input_fact(0, f32::fact(self.input_shape).into()))
            .and_then(|m| m.into_optimized())
            .map_err(|e| InferenceError::EngineInit(e.to_string()))
    }
}

impl Default for TractInterpreterFactory {
    fn default() -> Self {
        Self::new(224)
    }
}

impl InterpreterFactory for TractInterpreterFactory {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn create(&self, model: &[u8], options: InterpreterOptions) -> Result<Box<dyn Interpreter>, InferenceError> {
        if options.use_accel {
            return Err(InferenceError::DelegateUnavailable(
                "tract backend has no hardware delegate; build with the `cuda` feature".into(),
            ));
        }

        let typed = self.optimized(model)?;
        let output_len = output_width(&typed)?;
        let plan = typed
            .into_runnable()
            .map_err(|e| InferenceError::EngineInit(e.to_string()))?;

        info!("tract interpreter ready: input {:?}, {} outputs", self.input_shape, output_len);
        Ok(Box::new(TractInterpreter {
            plan,
            input_shape: self.input_shape,
            output_len,
        }))
    }

    fn output_width(&self, model: &[u8]) -> Result<usize, InferenceError> {
        output_width(&self.optimized(model)?)
    }
}

fn output_width(model: &TypedModel) -> Result<usize, InferenceError> {
    let fact = model
        .output_fact(0)
        .map_err(|e| InferenceError::EngineInit(e.to_string()))?;
    let shape = fact
        .shape
        .as_concrete()
        .ok_or_else(|| InferenceError::EngineInit("model output shape is not concrete".into()))?;
    debug!("Model output shape {:?}", shape);
    shape
        .last()
        .copied()
        .ok_or_else(|| InferenceError::EngineInit("model output is a scalar".into()))
}

struct TractInterpreter {
    plan: TypedRunnableModel<TypedModel>,
    input_shape: [usize; 4],
    output_len: usize,
}

impl Interpreter for TractInterpreter {
    fn output_len(&self) -> usize {
        self.output_len
    }

    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), InferenceError> {
        let tensor = Tensor::from_shape(&self.input_shape, input)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let scores = outputs[0]
            .as_slice::<f32>()
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

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
