//! Pipeline controller
//!
//! Single choke point between the frame producer and the inference worker:
//! at most one frame is processed at a time, and no submission races an
//! init/close transition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use frame_convert::{FrameConverter, FrameError, RawFrame};
use inference_engine::{
    rank, EngineState, InferenceEngine, InferenceError, InitHandle, InterpreterFactory, LabelTable, Session,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::assets::ModelAssets;
use crate::config::ClassifierConfig;
use crate::listener::ResultListener;
use crate::report::Recognition;
use crate::PipelineError;

/// Outcome of handing a frame to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Queued on the worker; the listener will be called unless the engine closes first
    Scheduled,
    /// Engine was not ready; the frame has already been released
    Dropped(EngineState),
}

/// Drives frames through convert, preprocess, infer, rank, deliver
pub struct PipelineController {
    engine: Mutex<InferenceEngine>,
    converter: FrameConverter,
    labels: LabelTable,
    listener: Arc<dyn ResultListener>,
    top_k: usize,
    throttle: Duration,
}

impl PipelineController {
    /// Create a controller. The engine starts `Uninitialized`.
    pub fn new<L: ResultListener>(
        assets: ModelAssets,
        factory: Arc<dyn InterpreterFactory>,
        config: &ClassifierConfig,
        listener: L,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let converter = FrameConverter::new(config.converter_config())?;
        let engine = InferenceEngine::new(assets.model().clone(), factory, config.engine_config());

        info!(
            "Pipeline controller created: {} labels, top {}, throttle {}ms",
            assets.labels().len(),
            config.top_k,
            config.analyze_throttle_ms
        );

        Ok(Self {
            engine: Mutex::new(engine),
            converter,
            labels: assets.labels().clone(),
            listener: Arc::new(listener),
            top_k: config.top_k,
            throttle: config.analyze_throttle(),
        })
    }

    fn engine(&self) -> MutexGuard<'_, InferenceEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        self.engine().state()
    }

    /// Start the worker and construct the interpreter
    pub fn init(&self, use_accel: bool) -> InitHandle {
        self.engine().init(use_accel)
    }

    /// Tear down the interpreter; results of pending frames are discarded
    pub fn close(&self) {
        self.engine().close();
    }

    /// Hand a frame to the worker.
    ///
    /// Returns as soon as the work is queued. The frame is released on every
    /// path: immediately when the engine is not ready, otherwise by the worker
    /// as its last step.
    pub fn submit(&self, frame: RawFrame) -> Submission {
        let engine = self.engine();

        let state = engine.state();
        if state != EngineState::Ready {
            debug!("Engine {}, releasing frame {}", state, frame.sequence());
            frame.release();
            return Submission::Dropped(state);
        }

        let converter = self.converter;
        let labels = self.labels.clone();
        let listener = self.listener.clone();
        let top_k = self.top_k;

        let job = move |session: &mut Session| {
            let sequence = frame.sequence();
            match classify(&converter, session, &labels, top_k, &frame) {
                Ok(recognition) => {
                    if session.deliver(|| listener.on_result(recognition)).is_none() {
                        debug!("Engine closed, discarding result for frame {}", sequence);
                    }
                }
                Err(PipelineError::Frame(FrameError::InvalidFrame)) => {
                    debug!("Frame {} has no image data, skipped", sequence);
                }
                Err(e) => warn!("Frame {} classification failed: {}", sequence, e),
            }
            frame.release();
        };

        match engine.execute(job) {
            Ok(()) => Submission::Scheduled,
            Err(e) => {
                // The job, and the frame with it, was dropped
                warn!("Failed to schedule frame: {}", e);
                Submission::Dropped(engine.state())
            }
        }
    }

    /// Wait until every frame scheduled before this call has been processed.
    ///
    /// Fails when the engine is not `Ready` or closes before the queue empties.
    pub async fn drain(&self) -> Result<(), PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.engine().execute(move |_session| {
            let _ = tx.send(());
        })?;
        rx.await.map_err(|_| PipelineError::Inference(InferenceError::Cancelled))
    }

    /// Submit, then sleep on the caller's thread.
    ///
    /// The sleep throttles the producer; it never delays the worker.
    pub fn analyze(&self, frame: RawFrame) -> Submission {
        let submission = self.submit(frame);
        thread::sleep(self.throttle);
        submission
    }
}

fn classify(
    converter: &FrameConverter,
    session: &mut Session,
    labels: &LabelTable,
    top_k: usize,
    frame: &RawFrame,
) -> Result<Recognition, PipelineError> {
    let grid = converter.convert(frame)?;
    let scores = session.run(&grid)?;
    let top = rank(labels, scores, top_k)?;
    Ok(Recognition::new(frame.sequence(), session.last_elapsed(), top))
}
