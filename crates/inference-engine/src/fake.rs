//! Fake interpreter backend for tests and dry runs
//!
//! Produces a fixed score vector, counts constructions and runs, and can be told
//! to fail or to block construction or forward passes until a [`Gate`] opens.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tracing::debug;

use crate::interpreter::{Interpreter, InterpreterFactory, InterpreterOptions};
use crate::InferenceError;

/// One-way latch shared between a test and the worker
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every current and future waiter through
    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Block until opened
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut open = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = cvar.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Interpreter factory returning canned scores
#[derive(Debug, Clone)]
pub struct FakeInterpreterFactory {
    scores: Arc<[f32]>,
    constructions: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
    pending_failures: Arc<AtomicUsize>,
    accel_supported: bool,
    gate: Option<Gate>,
    run_gate: Option<Gate>,
}

impl FakeInterpreterFactory {
    /// Factory whose interpreters always output `scores`
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores: scores.into(),
            constructions: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
            pending_failures: Arc::new(AtomicUsize::new(0)),
            accel_supported: true,
            gate: None,
            run_gate: None,
        }
    }

    /// Fail the next `count` constructions with `EngineInit`
    pub fn failing(self, count: usize) -> Self {
        self.pending_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Reject accelerated construction with `DelegateUnavailable`
    pub fn without_accel(mut self) -> Self {
        self.accel_supported = false;
        self
    }

    /// Block construction until `gate` opens
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Block every forward pass until `gate` opens. The run is counted before blocking.
    pub fn gated_runs(mut self, gate: Gate) -> Self {
        self.run_gate = Some(gate);
        self
    }

    /// Interpreters constructed so far (including failed attempts)
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Forward passes run so far
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl InterpreterFactory for FakeInterpreterFactory {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn create(&self, _model: &[u8], options: InterpreterOptions) -> Result<Box<dyn Interpreter>, InferenceError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let n = self.constructions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Fake interpreter construction #{}", n);

        if options.use_accel && !self.accel_supported {
            return Err(InferenceError::DelegateUnavailable("fake backend has no delegate".into()));
        }
        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(InferenceError::EngineInit("fake construction failure".into()));
        }

        Ok(Box::new(FakeInterpreter {
            scores: self.scores.clone(),
            runs: self.runs.clone(),
            gate: self.run_gate.clone(),
        }))
    }

    fn output_width(&self, _model: &[u8]) -> Result<usize, InferenceError> {
        Ok(self.scores.len())
    }
}

struct FakeInterpreter {
    scores: Arc<[f32]>,
    runs: Arc<AtomicUsize>,
    gate: Option<Gate>,
}

impl Interpreter for FakeInterpreter {
    fn output_len(&self) -> usize {
        self.scores.len()
    }

    fn run(&mut self, _input: &[f32], output: &mut [f32]) -> Result<(), InferenceError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        output.copy_from_slice(&self.scores);
        Ok(())
    }
}
