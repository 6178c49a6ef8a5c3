//! Result delivery from the worker to the outside world

use std::sync::mpsc;

use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

use crate::report::Recognition;

/// Receives one [`Recognition`] per classified frame.
///
/// Called on the inference worker thread; implementations that feed a UI
/// should hop to their own thread.
pub trait ResultListener: Send + Sync + 'static {
    fn on_result(&self, recognition: Recognition);
}

impl ResultListener for mpsc::Sender<Recognition> {
    fn on_result(&self, recognition: Recognition) {
        if self.send(recognition).is_err() {
            debug!("Result receiver dropped");
        }
    }
}

impl ResultListener for tokio_mpsc::UnboundedSender<Recognition> {
    fn on_result(&self, recognition: Recognition) {
        if self.send(recognition).is_err() {
            debug!("Result receiver dropped");
        }
    }
}

/// Adapts a closure into a listener
pub struct FnListener<F>(pub F);

impl<F> ResultListener for FnListener<F>
where
    F: Fn(Recognition) + Send + Sync + 'static,
{
    fn on_result(&self, recognition: Recognition) {
        (self.0)(recognition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fn_listener() {
        let seen = Arc::new(AtomicU64::new(0));
        let sink = seen.clone();
        let listener = FnListener(move |r: Recognition| {
            sink.store(r.sequence, Ordering::SeqCst);
        });
        listener.on_result(Recognition::new(9, Duration::ZERO, vec![]));
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        tx.on_result(Recognition::new(1, Duration::ZERO, vec![]));
    }
}
