//! Single-thread execution contexts backing the worker pool.
//!
//! Each worker is one named OS thread servicing a FIFO job queue. The thread
//! owns a current-thread tokio runtime so dispatched futures resume on the
//! same thread across suspension points. An idle worker thread exits after
//! the configured idle timeout and is respawned on the next dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use super::error::Error;

/// A job dispatched onto a worker thread. The worker hands the job its
/// runtime so dispatched futures are driven to completion on that thread.
pub(crate) type Job = Box<dyn FnOnce(&tokio::runtime::Runtime) + Send + 'static>;

struct WorkerShared {
    name: String,
    idle_timeout: Duration,
    closed: AtomicBool,
    /// Live job sender. `None` while no thread is running; the spawn/cull
    /// handshake happens entirely under this lock.
    sender: Mutex<Option<Sender<Job>>>,
}

/// Handle to a single-thread execution context. Cheap to clone; all clones
/// address the same thread.
#[derive(Clone)]
pub(crate) struct Worker {
    shared: Arc<WorkerShared>,
}

impl Worker {
    /// Create a worker and eagerly spawn its thread.
    pub(crate) fn new(name: String, idle_timeout: Duration) -> Self {
        let shared = Arc::new(WorkerShared {
            name,
            idle_timeout,
            closed: AtomicBool::new(false),
            sender: Mutex::new(None),
        });
        let tx = spawn_thread(&shared);
        *shared.sender.lock() = Some(tx);
        Self { shared }
    }

    /// Stable identity of this worker.
    pub(crate) fn name(&self) -> &str {
        &self.shared.name
    }

    /// Enqueue a job, respawning the thread if it was culled while idle.
    pub(crate) fn dispatch(&self, job: Job) -> Result<(), Error> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }
        let mut sender = self.shared.sender.lock();
        if sender.is_none() {
            *sender = Some(spawn_thread(&self.shared));
        }
        let Some(tx) = sender.as_ref() else {
            return Err(Error::PoolClosed);
        };
        match tx.send(job) {
            Ok(()) => Ok(()),
            Err(returned) => {
                // Thread died without clearing its slot; respawn once.
                let tx = spawn_thread(&self.shared);
                let result = tx.send(returned.into_inner()).map_err(|_| Error::PoolClosed);
                *sender = Some(tx);
                result
            }
        }
    }

    /// Signal the worker to shut down. The in-flight job and anything already
    /// queued still run; the thread exits once the queue drains. Idempotent.
    pub(crate) fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.shared.sender.lock() = None;
        debug!(worker = %self.shared.name, "worker closed");
    }
}

fn spawn_thread(shared: &Arc<WorkerShared>) -> Sender<Job> {
    let (tx, rx) = unbounded::<Job>();
    let shared = Arc::clone(shared);
    let name = shared.name.clone();
    thread::Builder::new()
        .name(name)
        .spawn(move || run_loop(&shared, &rx))
        .expect("failed to spawn worker thread");
    tx
}

fn run_loop(shared: &Arc<WorkerShared>, rx: &Receiver<Job>) {
    debug!(worker = %shared.name, "worker thread started");

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(worker = %shared.name, error = %e, "failed to create worker runtime");
            *shared.sender.lock() = None;
            return;
        }
    };

    loop {
        match rx.recv_timeout(shared.idle_timeout) {
            Ok(job) => {
                if catch_unwind(AssertUnwindSafe(|| job(&rt))).is_err() {
                    error!(worker = %shared.name, "dispatched job panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Cull only if nothing raced in; dispatch holds the same lock
                // while sending.
                let mut sender = shared.sender.lock();
                if rx.is_empty() {
                    *sender = None;
                    debug!(worker = %shared.name, "worker thread idle, exiting");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!(worker = %shared.name, "worker channel closed, exiting");
                return;
            }
        }
    }
}
