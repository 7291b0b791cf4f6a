//! Bounded pool of single-thread workers with suspending acquire.
//!
//! Capacity and fairness live in a token channel (a closable semaphore of N
//! permits); handoff ordering lives in a deque of worker handles. Receiving a
//! token and popping a handle is an acquire; pushing a handle and returning a
//! token is a release. Closing the token channel wakes every waiter, so
//! shutdown is observable in bounded time even when the pool is saturated.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, info};

use super::worker::Worker;
use crate::config::HandoffOrder;

/// Outcome of a non-blocking acquire attempt.
pub(crate) enum TryAcquire {
    /// A token and a handle were both available.
    Acquired(Worker),
    /// No token is currently available.
    Empty,
    /// The pool is closed.
    Closed,
}

/// Fixed-size set of workers. Invariant: workers held by tasks plus workers
/// queued here always sum to the configured capacity, except during shutdown.
pub(crate) struct WorkerPool {
    tokens: Semaphore,
    handles: Mutex<VecDeque<Worker>>,
    ordering: HandoffOrder,
    capacity: usize,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Create a pool of `capacity` workers, each named after the pool.
    pub(crate) fn new(
        name: &str,
        capacity: usize,
        idle_timeout: Duration,
        ordering: HandoffOrder,
    ) -> Self {
        let handles = (0..capacity)
            .map(|i| Worker::new(format!("{name}-worker-{i}"), idle_timeout))
            .collect::<VecDeque<_>>();
        info!(
            pool = name,
            capacity,
            idle_timeout_ms = idle_timeout.as_millis() as u64,
            "worker pool initialized"
        );
        Self {
            tokens: Semaphore::new(capacity),
            handles: Mutex::new(handles),
            ordering,
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Configured capacity.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking acquire.
    pub(crate) fn try_acquire(&self) -> TryAcquire {
        match self.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                match self.pop_handle() {
                    Some(worker) => TryAcquire::Acquired(worker),
                    None => TryAcquire::Closed,
                }
            }
            Err(TryAcquireError::NoPermits) => TryAcquire::Empty,
            Err(TryAcquireError::Closed) => TryAcquire::Closed,
        }
    }

    /// Suspend until a worker is available. Returns `None` if the pool closes
    /// while waiting. Cancelling the returned future consumes no token.
    pub(crate) async fn acquire(&self) -> Option<Worker> {
        match self.tokens.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.pop_handle()
            }
            Err(_closed) => None,
        }
    }

    /// Return a worker to the pool. Callable from any thread. After close the
    /// worker is shut down and dropped silently.
    pub(crate) fn release(&self, worker: Worker) {
        if self.closed.load(Ordering::Acquire) {
            worker.close();
            return;
        }
        {
            let mut handles = self.handles.lock();
            match self.ordering {
                HandoffOrder::Lifo => handles.push_front(worker),
                HandoffOrder::Fifo => handles.push_back(worker),
            }
        }
        self.tokens.add_permits(1);
    }

    /// Close the pool: wake every waiter, then drain and close each remaining
    /// handle exactly once. Workers released afterwards are closed on release.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.tokens.close();
        let drained: Vec<Worker> = self.handles.lock().drain(..).collect();
        let remaining = drained.len();
        for worker in drained {
            worker.close();
        }
        debug!(remaining, "worker pool closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of workers currently queued (not held by tasks).
    pub(crate) fn available(&self) -> usize {
        self.handles.lock().len()
    }

    fn pop_handle(&self) -> Option<Worker> {
        self.handles.lock().pop_front()
    }
}
