//! Acquisition events emitted by the sticky dispatcher.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

/// Events observed while acquiring a worker from the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionEvent {
    /// The acquire timeout elapsed before a worker became available.
    Timeout {
        /// The configured acquire timeout.
        timeout: Duration,
    },
    /// A worker was acquired, but slower than the configured threshold.
    ThresholdExceeded {
        /// Time the acquire actually took.
        elapsed: Duration,
        /// The configured threshold that was exceeded.
        threshold: Duration,
    },
}

/// Observer of worker-acquisition events.
///
/// Listener failures never reach the acquiring caller; a panicking listener
/// is logged and the remaining listeners still run.
pub trait AcquisitionListener: Send + Sync {
    /// Called for every acquisition event, before the acquire returns.
    fn on_acquisition(&self, event: &AcquisitionEvent);
}

/// Default listener logging acquisition events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl AcquisitionListener for LogListener {
    fn on_acquisition(&self, event: &AcquisitionEvent) {
        match event {
            AcquisitionEvent::Timeout { timeout } => {
                warn!(timeout_ms = timeout.as_millis() as u64, "worker acquisition timed out");
            }
            AcquisitionEvent::ThresholdExceeded { elapsed, threshold } => {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "worker acquisition exceeded threshold"
                );
            }
        }
    }
}

/// Deliver an event to every listener, isolating panics.
pub(crate) fn notify_all(listeners: &[Arc<dyn AcquisitionListener>], event: &AcquisitionEvent) {
    for listener in listeners {
        let result = catch_unwind(AssertUnwindSafe(|| listener.on_acquisition(event)));
        if result.is_err() {
            error!(?event, "acquisition listener panicked; continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording(AtomicUsize);

    impl AcquisitionListener for Recording {
        fn on_acquisition(&self, _event: &AcquisitionEvent) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct Exploding;

    impl AcquisitionListener for Exploding {
        fn on_acquisition(&self, _event: &AcquisitionEvent) {
            panic!("listener bug");
        }
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let recording = Arc::new(Recording(AtomicUsize::new(0)));
        let listeners: Vec<Arc<dyn AcquisitionListener>> = vec![
            Arc::new(Exploding),
            Arc::clone(&recording) as Arc<dyn AcquisitionListener>,
        ];
        notify_all(
            &listeners,
            &AcquisitionEvent::Timeout {
                timeout: Duration::from_millis(5),
            },
        );
        assert_eq!(recording.0.load(Ordering::Relaxed), 1);
    }
}
