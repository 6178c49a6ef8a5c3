//! Single dedicated worker thread

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::Session;
use crate::InferenceError;

/// Work item executed on the worker thread
pub(crate) type Job = Box<dyn FnOnce(&mut WorkerContext) + Send + 'static>;

enum Command {
    Run(Job),
    Teardown,
}

/// Close flag shared by the engine handle and the worker thread.
///
/// Setting it waits for any section running under [`CancelFlag::unless_cancelled`],
/// so nothing guarded by it runs after `cancel` returns.
#[derive(Debug, Default)]
pub(crate) struct CancelFlag {
    cancelled: Mutex<bool>,
}

impl CancelFlag {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn cancel(&self) {
        *self.lock() = true;
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Run `f` unless cancelled, holding off `cancel` until it returns
    pub(crate) fn unless_cancelled<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let cancelled = self.lock();
        if *cancelled {
            return None;
        }
        Some(f())
    }
}

/// State owned by the worker thread
pub(crate) struct WorkerContext {
    pub(crate) session: Option<Session>,
    pub(crate) cancelled: Arc<CancelFlag>,
    stop: bool,
}

impl WorkerContext {
    /// Exit the loop after the current job
    pub(crate) fn stop(&mut self) {
        self.stop = true;
    }
}

/// Handle to the worker thread of one engine generation
pub(crate) struct Worker {
    generation: u64,
    sender: mpsc::UnboundedSender<Command>,
    cancelled: Arc<CancelFlag>,
}

impl Worker {
    /// Spawn the worker thread
    pub(crate) fn spawn(generation: u64) -> Result<Self, InferenceError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancelled = Arc::new(CancelFlag::default());
        let flag = cancelled.clone();

        thread::Builder::new()
            .name(format!("inference-worker-{}", generation))
            .spawn(move || run_loop(generation, receiver, flag))?;

        debug!("Spawned inference worker (generation {})", generation);
        Ok(Self {
            generation,
            sender,
            cancelled,
        })
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a job. If the thread already exited the job is dropped.
    pub(crate) fn submit(&self, job: Job) -> Result<(), InferenceError> {
        self.sender
            .send(Command::Run(job))
            .map_err(|_| InferenceError::Cancelled)
    }

    /// Cancel queued work, schedule teardown, and detach the thread.
    ///
    /// Queued jobs are dropped unexecuted; a job already running observes the
    /// cancellation flag through its session.
    pub(crate) fn shutdown(self) {
        self.cancelled.cancel();
        let _ = self.sender.send(Command::Teardown);
        debug!("Inference worker {} shut down", self.generation);
    }
}

fn run_loop(generation: u64, mut receiver: mpsc::UnboundedReceiver<Command>, cancelled: Arc<CancelFlag>) {
    let mut ctx = WorkerContext {
        session: None,
        cancelled,
        stop: false,
    };

    while let Some(command) = receiver.blocking_recv() {
        match command {
            Command::Run(job) => {
                if ctx.cancelled.is_cancelled() {
                    debug!("Discarding queued job after close");
                    drop(job);
                    continue;
                }
                job(&mut ctx);
                if ctx.stop {
                    break;
                }
            }
            Command::Teardown => {
                ctx.session.take();
                break;
            }
        }
    }

    // Anything still queued is dropped with the receiver
    info!("Inference worker {} exited", generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_order_on_worker() {
        let worker = Worker::spawn(1).unwrap();
        let (tx, rx) = std_mpsc::channel();
        for i in 0..3 {
            let tx = tx.clone();
            worker
                .submit(Box::new(move |_ctx: &mut WorkerContext| {
                    let name = thread::current().name().map(str::to_string);
                    tx.send((i, name)).unwrap();
                }))
                .unwrap();
        }
        for i in 0..3 {
            let (got, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(got, i);
            assert_eq!(name.as_deref(), Some("inference-worker-1"));
        }
        worker.shutdown();
    }

    #[test]
    fn test_cancel_waits_for_guarded_section() {
        let flag = Arc::new(CancelFlag::default());
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (resume_tx, resume_rx) = std_mpsc::channel::<()>();

        let guarded = flag.clone();
        let section = thread::spawn(move || {
            guarded.unless_cancelled(|| {
                entered_tx.send(()).unwrap();
                resume_rx.recv().unwrap();
            })
        });

        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let canceller = flag.clone();
        let cancel = thread::spawn(move || canceller.cancel());
        resume_tx.send(()).unwrap();

        assert_eq!(section.join().unwrap(), Some(()));
        cancel.join().unwrap();
        assert!(flag.is_cancelled());
        assert_eq!(flag.unless_cancelled(|| 1), None);
    }

    #[test]
    fn test_queued_jobs_discarded_on_shutdown() {
        let worker = Worker::spawn(2).unwrap();
        let (started_tx, started_rx) = std_mpsc::channel();
        let (resume_tx, resume_rx) = std_mpsc::channel::<()>();
        let (ran_tx, ran_rx) = std_mpsc::channel::<()>();

        worker
            .submit(Box::new(move |_ctx: &mut WorkerContext| {
                started_tx.send(()).unwrap();
                let _ = resume_rx.recv();
            }))
            .unwrap();
        worker
            .submit(Box::new(move |_ctx: &mut WorkerContext| {
                ran_tx.send(()).unwrap();
            }))
            .unwrap();

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        worker.shutdown();
        resume_tx.send(()).unwrap();

        // Second job is dropped, so its sender disconnects without sending
        assert_eq!(
            ran_rx.recv_timeout(Duration::from_secs(5)),
            Err(std_mpsc::RecvTimeoutError::Disconnected)
        );
    }
}
