//! Host lifecycle integration.
//!
//! Dispatchers live as children of the host's configuration object; there is
//! no process-wide registry. A [`LifecycleBinding`] holds the dispatchers one
//! host owns and closes them when the host's shutdown event fires.

use std::future::Future;

use tracing::info;

use crate::core::dispatcher::Dispatcher;

/// Binds a host's dispatchers to its shutdown event.
#[derive(Default)]
pub struct LifecycleBinding {
    dispatchers: Vec<Dispatcher>,
}

impl LifecycleBinding {
    /// Create an empty binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a dispatcher for shutdown purposes.
    pub fn register(&mut self, dispatcher: Dispatcher) {
        self.dispatchers.push(dispatcher);
    }

    /// Number of registered dispatchers.
    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    /// Whether no dispatchers are registered.
    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    /// Close every registered dispatcher.
    pub fn close_all(&self) {
        for dispatcher in &self.dispatchers {
            dispatcher.close();
        }
        info!(count = self.dispatchers.len(), "dispatchers closed");
    }

    /// Wait for the host's shutdown signal, then close every dispatcher.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        shutdown.await;
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatcherSettings, HandoffOrder};
    use crate::core::dispatcher::StickyDispatcher;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_signal_closes_dispatchers() {
        let dispatcher = StickyDispatcher::new(
            "lifecycle",
            DispatcherSettings {
                pool_size: 1,
                idle_timeout: Duration::from_secs(60),
                acquire_timeout: Duration::from_secs(5),
                acquire_threshold: None,
                ordering: HandoffOrder::Lifo,
            },
            Vec::new(),
        );
        let mut binding = LifecycleBinding::new();
        binding.register(Dispatcher::Sticky(dispatcher.clone()));
        assert_eq!(binding.len(), 1);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(binding.run_until(async {
            let _ = rx.await;
        }));
        assert!(!dispatcher.is_closed());
        tx.send(()).unwrap();
        task.await.unwrap();
        assert!(dispatcher.is_closed());
    }
}
