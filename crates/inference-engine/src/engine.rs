//! Inference engine lifecycle
//!
//! ```text
//! Uninitialized --init--> Initializing --constructed--> Ready --close--> Closed
//!       ^                      |                                           |
//!       +------- failed -------+                  Initializing <---init----+
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::interpreter::{Interpreter, InterpreterFactory, InterpreterOptions};
use crate::preprocess::{TensorPreprocessor, IMAGE_MEAN, IMAGE_STD};
use crate::worker::{CancelFlag, Worker, WorkerContext};
use crate::InferenceError;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl EngineState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Closed => "closed",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input geometry and normalization for sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Square input edge in pixels
    pub input_size: u32,
    /// Per-channel mean
    pub mean: f32,
    /// Per-channel standard deviation
    pub std: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            mean: IMAGE_MEAN,
            std: IMAGE_STD,
        }
    }
}

/// Interpreter plus its reusable input and output buffers.
///
/// Only exists on the worker thread, and only once construction succeeded,
/// so holding a `&mut Session` means the engine was `Ready`.
pub struct Session {
    interpreter: Box<dyn Interpreter>,
    preprocessor: TensorPreprocessor,
    output: Vec<f32>,
    last_elapsed: Duration,
    cancelled: Arc<CancelFlag>,
}

impl Session {
    fn new(interpreter: Box<dyn Interpreter>, config: &EngineConfig, cancelled: Arc<CancelFlag>) -> Self {
        let output = vec![0.0; interpreter.output_len()];
        Self {
            interpreter,
            preprocessor: TensorPreprocessor::new(config.input_size, config.input_size, config.mean, config.std),
            output,
            last_elapsed: Duration::ZERO,
            cancelled,
        }
    }

    /// Normalize `grid` and run one forward pass
    pub fn run(&mut self, grid: &RgbImage) -> Result<&[f32], InferenceError> {
        let input = self.preprocessor.process(grid)?;

        let start = Instant::now();
        self.interpreter.run(input, &mut self.output)?;
        self.last_elapsed = start.elapsed();
        debug!("Inference completed in {:?}", self.last_elapsed);

        Ok(&self.output)
    }

    /// Run one forward pass on an already normalized tensor
    pub fn run_tensor(&mut self, input: &[f32]) -> Result<&[f32], InferenceError> {
        if input.len() != self.preprocessor.len() {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", self.preprocessor.shape()),
                actual: input.len().to_string(),
            });
        }

        let start = Instant::now();
        self.interpreter.run(input, &mut self.output)?;
        self.last_elapsed = start.elapsed();

        Ok(&self.output)
    }

    /// Wall-clock duration of the last forward pass
    pub fn last_elapsed(&self) -> Duration {
        self.last_elapsed
    }

    /// Length of the output vector
    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    /// True once the engine was closed; results must not be delivered
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// Run `deliver` unless the engine was closed.
    ///
    /// `close` does not return while `deliver` runs, so nothing delivered
    /// through here is observed after close. `deliver` must not close the engine.
    pub fn deliver<R>(&self, deliver: impl FnOnce() -> R) -> Option<R> {
        self.cancelled.unless_cancelled(deliver)
    }
}

/// Completion of [`InferenceEngine::init`]
pub struct InitHandle {
    inner: InitInner,
}

enum InitInner {
    Done(Option<Result<(), InferenceError>>),
    Pending(oneshot::Receiver<Result<(), InferenceError>>),
}

impl InitHandle {
    fn done(result: Result<(), InferenceError>) -> Self {
        Self {
            inner: InitInner::Done(Some(result)),
        }
    }

    fn pending(receiver: oneshot::Receiver<Result<(), InferenceError>>) -> Self {
        Self {
            inner: InitInner::Pending(receiver),
        }
    }

    /// Block the current thread until initialization finishes.
    ///
    /// Must not be called from inside an async runtime; `.await` the handle there.
    pub fn wait(self) -> Result<(), InferenceError> {
        match self.inner {
            InitInner::Done(result) => result.unwrap_or(Err(InferenceError::Cancelled)),
            InitInner::Pending(receiver) => receiver.blocking_recv().unwrap_or(Err(InferenceError::Cancelled)),
        }
    }
}

impl Future for InitHandle {
    type Output = Result<(), InferenceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            InitInner::Done(result) => Poll::Ready(result.take().unwrap_or(Err(InferenceError::Cancelled))),
            InitInner::Pending(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|r| r.unwrap_or(Err(InferenceError::Cancelled))),
        }
    }
}

struct Lifecycle {
    state: EngineState,
    generation: u64,
}

fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the model bytes, the interpreter factory, and the worker running the interpreter
pub struct InferenceEngine {
    model: Arc<[u8]>,
    factory: Arc<dyn InterpreterFactory>,
    config: EngineConfig,
    lifecycle: Arc<Mutex<Lifecycle>>,
    worker: Option<Worker>,
}

impl InferenceEngine {
    /// Create an engine; nothing is constructed until [`InferenceEngine::init`]
    pub fn new(model: impl Into<Arc<[u8]>>, factory: Arc<dyn InterpreterFactory>, config: EngineConfig) -> Self {
        let model = model.into();
        info!(
            "Creating inference engine: backend={}, model={} bytes, input={}x{}",
            factory.name(),
            model.len(),
            config.input_size,
            config.input_size
        );
        Self {
            model,
            factory,
            config,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: EngineState::Uninitialized,
                generation: 0,
            })),
            worker: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        lock(&self.lifecycle).state
    }

    /// Spawn the worker and construct the interpreter on it.
    ///
    /// Returns immediately when already `Ready` or `Initializing`. A failed
    /// construction leaves the engine `Uninitialized`; there is no fallback
    /// from an accelerated to a plain interpreter.
    pub fn init(&mut self, use_accel: bool) -> InitHandle {
        let mut lifecycle = lock(&self.lifecycle);
        if matches!(lifecycle.state, EngineState::Ready | EngineState::Initializing) {
            debug!("init ignored, engine already {}", lifecycle.state);
            return InitHandle::done(Ok(()));
        }

        let generation = lifecycle.generation + 1;
        let worker = match Worker::spawn(generation) {
            Ok(worker) => worker,
            Err(e) => {
                error!("Failed to spawn inference worker: {}", e);
                return InitHandle::done(Err(e));
            }
        };
        lifecycle.generation = generation;
        lifecycle.state = EngineState::Initializing;
        info!("Initializing engine (generation {}, accelerated: {})", generation, use_accel);

        let (tx, rx) = oneshot::channel();
        let model = self.model.clone();
        let factory = self.factory.clone();
        let config = self.config;
        let shared = self.lifecycle.clone();

        let construct = move |ctx: &mut WorkerContext| {
            let created = factory.create(&model, InterpreterOptions { use_accel });

            let mut lifecycle = lock(&shared);
            let current = lifecycle.generation == generation && lifecycle.state == EngineState::Initializing;
            let outcome = match created {
                Ok(interpreter) if current => {
                    ctx.session = Some(Session::new(interpreter, &config, ctx.cancelled.clone()));
                    lifecycle.state = EngineState::Ready;
                    info!("Engine ready (generation {})", generation);
                    Ok(())
                }
                Ok(_) => {
                    debug!("Engine closed during construction (generation {})", generation);
                    Err(InferenceError::Cancelled)
                }
                Err(e) => {
                    error!("Interpreter construction failed: {}", e);
                    if current {
                        lifecycle.state = EngineState::Uninitialized;
                    }
                    ctx.stop();
                    Err(e)
                }
            };
            drop(lifecycle);

            let _ = tx.send(outcome);
        };

        if let Err(e) = worker.submit(Box::new(construct)) {
            lifecycle.state = EngineState::Uninitialized;
            return InitHandle::done(Err(e));
        }
        self.worker = Some(worker);

        InitHandle::pending(rx)
    }

    /// Queue `job` on the worker with the ready session.
    ///
    /// Outside `Ready` this is caller misuse: the job is dropped and
    /// `NotReady` returned. If the worker thread died, the engine drops back
    /// to `Uninitialized`.
    pub fn execute<F>(&self, job: F) -> Result<(), InferenceError>
    where
        F: FnOnce(&mut Session) + Send + 'static,
    {
        let mut lifecycle = lock(&self.lifecycle);
        let worker = match (&self.worker, lifecycle.state) {
            (Some(worker), EngineState::Ready) => worker,
            (_, state) => return Err(InferenceError::NotReady(state)),
        };

        let submitted = worker.submit(Box::new(move |ctx: &mut WorkerContext| match ctx.session.as_mut() {
            Some(session) => job(session),
            None => warn!("Dropping job: worker has no session"),
        }));

        if submitted.is_err() {
            // Worker thread is gone (a job panicked); let the next init start over
            error!("Inference worker {} exited unexpectedly", worker.generation());
            lifecycle.state = EngineState::Uninitialized;
            return Err(InferenceError::InferenceFailed("inference worker exited".into()));
        }
        Ok(())
    }

    /// Tear down the interpreter and stop the worker.
    ///
    /// Queued jobs are discarded; an in-flight job sees `Session::is_cancelled`.
    /// No-op when `Uninitialized` or `Closed`.
    pub fn close(&mut self) {
        let mut lifecycle = lock(&self.lifecycle);
        match lifecycle.state {
            EngineState::Ready | EngineState::Initializing => {
                if let Some(worker) = self.worker.take() {
                    debug!("Closing worker generation {}", worker.generation());
                    worker.shutdown();
                }
                lifecycle.state = EngineState::Closed;
                info!("Engine closed (generation {})", lifecycle.generation);
            }
            EngineState::Uninitialized | EngineState::Closed => {
                debug!("close ignored, engine {}", lifecycle.state);
            }
        }
    }

    /// Backend name of the interpreter factory
    pub fn backend(&self) -> &'static str {
        self.factory.name()
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.close();
    }
}
