//! Interpreter backend seam

use crate::InferenceError;

/// Options applied when constructing an interpreter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Attach a hardware delegate. Construction must fail rather than
    /// silently fall back to CPU if the delegate cannot be attached.
    pub use_accel: bool,
}

/// A constructed model ready to run. Lives on the worker thread only.
pub trait Interpreter {
    /// Number of scores written by [`Interpreter::run`]
    fn output_len(&self) -> usize;

    /// Run one forward pass. `input` is NHWC floats; `output` has `output_len()` slots.
    fn run(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), InferenceError>;
}

/// Builds interpreters from model bytes
pub trait InterpreterFactory: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Construct an interpreter. Called on the worker thread.
    fn create(&self, model: &[u8], options: InterpreterOptions) -> Result<Box<dyn Interpreter>, InferenceError>;

    /// Model output width, used to validate the label table at startup
    fn output_width(&self, model: &[u8]) -> Result<usize, InferenceError>;
}
