//! Sticky dispatcher: per-task worker affinity over the pool.
//!
//! The first `run` on a task acquires a worker, pins the task to it through a
//! task-local dispatch handle, and executes the block on that worker's
//! thread. Nested `run` calls on the same task find the handle and execute
//! inline, so every suspending call between begin and commit of a transaction
//! resumes on the pinned thread without touching the pool again.

use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use super::error::{Error, Result};
use super::events::{notify_all, AcquisitionEvent, AcquisitionListener};
use super::pool::WorkerPool;
use super::worker::{Job, Worker};
use crate::config::DispatcherSettings;

tokio::task_local! {
    static CURRENT_DISPATCH: DispatchHandle;
}

/// Opaque context value marking the current task as pinned to a worker of a
/// particular dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    dispatcher_id: Uuid,
    worker: Option<String>,
}

impl DispatchHandle {
    /// Name of the worker this task is pinned to, if dispatched onto one.
    pub fn worker(&self) -> Option<&str> {
        self.worker.as_deref()
    }
}

/// Returns the dispatch handle pinning the current task, if any.
pub fn current_dispatch() -> Option<DispatchHandle> {
    CURRENT_DISPATCH.try_with(Clone::clone).ok()
}

struct StickyInner {
    id: Uuid,
    name: String,
    pool: WorkerPool,
    settings: DispatcherSettings,
    listeners: Vec<Arc<dyn AcquisitionListener>>,
}

/// Dispatcher that binds each task to a single worker thread for the
/// duration of the outermost `run`.
#[derive(Clone)]
pub struct StickyDispatcher {
    inner: Arc<StickyInner>,
}

impl StickyDispatcher {
    /// Create a dispatcher with its own worker pool.
    pub fn new(
        name: impl Into<String>,
        settings: DispatcherSettings,
        listeners: Vec<Arc<dyn AcquisitionListener>>,
    ) -> Self {
        let name = name.into();
        let pool = WorkerPool::new(
            &name,
            settings.pool_size,
            settings.idle_timeout,
            settings.ordering,
        );
        Self {
            inner: Arc::new(StickyInner {
                id: Uuid::new_v4(),
                name,
                pool,
                settings,
                listeners,
            }),
        }
    }

    /// Dispatcher name, used to name worker threads.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configured worker capacity.
    pub fn capacity(&self) -> usize {
        self.inner.pool.capacity()
    }

    /// Run `block` with worker affinity.
    ///
    /// If the current task is already pinned to this dispatcher the block is
    /// invoked inline on the pinned worker. Otherwise a worker is acquired
    /// (bounded by the acquire timeout), the block runs on it under a fresh
    /// dispatch handle, and the worker is released on every exit path.
    pub async fn run<F, Fut, T>(&self, block: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let pinned = CURRENT_DISPATCH
            .try_with(|handle| handle.dispatcher_id == self.inner.id)
            .unwrap_or(false);
        if pinned {
            return Ok(block().await);
        }

        let acquire_timeout = self.inner.settings.acquire_timeout;
        let started = Instant::now();
        let worker = match tokio::time::timeout(acquire_timeout, self.inner.pool.acquire()).await {
            Ok(Some(worker)) => worker,
            Ok(None) => return Err(Error::PoolClosed),
            Err(elapsed) => {
                notify_all(
                    &self.inner.listeners,
                    &AcquisitionEvent::Timeout {
                        timeout: acquire_timeout,
                    },
                );
                return Err(Error::AcquireTimeout {
                    timeout: acquire_timeout,
                    source: elapsed,
                });
            }
        };
        if let Some(threshold) = self.inner.settings.acquire_threshold {
            let elapsed = started.elapsed();
            if elapsed > threshold {
                notify_all(
                    &self.inner.listeners,
                    &AcquisitionEvent::ThresholdExceeded { elapsed, threshold },
                );
            }
        }

        let handle = DispatchHandle {
            dispatcher_id: self.inner.id,
            worker: Some(worker.name().to_string()),
        };
        let (result_tx, result_rx) = oneshot::channel::<T>();

        // The lease travels with the job so release happens only after the
        // block has actually stopped running, whatever the exit path.
        let lease = WorkerLease {
            dispatcher: Arc::clone(&self.inner),
            worker: Some(worker.clone()),
        };
        let job: Job = Box::new(move |rt| {
            let _lease = lease;
            rt.block_on(CURRENT_DISPATCH.scope(handle, async move {
                let fut = block();
                tokio::pin!(fut);
                let mut result_tx = result_tx;
                tokio::select! {
                    biased;
                    out = &mut fut => {
                        let _ = result_tx.send(out);
                    }
                    // Caller dropped the result channel; abort at the next
                    // suspension point.
                    _ = result_tx.closed() => {}
                }
            }));
        });
        worker.dispatch(job)?;
        result_rx.await.map_err(|_| Error::PoolClosed)
    }

    /// Close the dispatcher's pool. Pending acquires resolve promptly with a
    /// closed result; releases afterwards are no-ops.
    pub fn close(&self) {
        self.inner.pool.close();
    }

    /// Whether the dispatcher has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }
}

struct WorkerLease {
    dispatcher: Arc<StickyInner>,
    worker: Option<Worker>,
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.dispatcher.pool.release(worker);
        }
    }
}

struct PassthroughInner {
    id: Uuid,
    advice: Once,
}

/// Conforming dispatcher for deployments without a worker pool: blocks run
/// on the caller's task under a shared dispatch handle.
#[derive(Clone)]
pub struct PassthroughDispatcher {
    inner: Arc<PassthroughInner>,
}

impl Default for PassthroughDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PassthroughDispatcher {
    /// Create a pass-through dispatcher.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PassthroughInner {
                id: Uuid::new_v4(),
                advice: Once::new(),
            }),
        }
    }

    /// Run `block` on the caller's task.
    pub async fn run<F, Fut, T>(&self, block: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let pinned = CURRENT_DISPATCH
            .try_with(|handle| handle.dispatcher_id == self.inner.id)
            .unwrap_or(false);
        if pinned {
            return Ok(block().await);
        }
        self.inner.advice.call_once(|| {
            info!("no worker pool configured; dispatched blocks run on the caller's thread");
        });
        let handle = DispatchHandle {
            dispatcher_id: self.inner.id,
            worker: None,
        };
        Ok(CURRENT_DISPATCH.scope(handle, block()).await)
    }
}

/// A dispatcher in either sticky or pass-through form.
#[derive(Clone)]
pub enum Dispatcher {
    /// Pool-backed dispatcher with thread affinity.
    Sticky(StickyDispatcher),
    /// Pool-less dispatcher running blocks on the caller's task.
    Passthrough(PassthroughDispatcher),
}

impl Dispatcher {
    /// Run `block` under this dispatcher's affinity contract.
    pub async fn run<F, Fut, T>(&self, block: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match self {
            Self::Sticky(dispatcher) => dispatcher.run(block).await,
            Self::Passthrough(dispatcher) => dispatcher.run(block).await,
        }
    }

    /// Close the dispatcher. A no-op for the pass-through variant.
    pub fn close(&self) {
        if let Self::Sticky(dispatcher) = self {
            dispatcher.close();
        }
    }
}
