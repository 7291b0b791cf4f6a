//! # Turnstile
//!
//! A thread-affinity worker pool and sticky dispatcher that make blocking,
//! connection-pool-backed SQL libraries safe to drive from async Rust.
//!
//! Blocking drivers lease a connection for the lifetime of a transaction and
//! expect every call on it to come from the thread that leased it. A naive
//! async integration breaks that: a task that suspends mid-transaction can
//! resume on another runtime thread, and the driver's pool deadlocks waiting
//! for a connection the task already holds elsewhere.
//!
//! ## How it works
//!
//! - A bounded pool of workers, each a single OS thread with a FIFO job queue
//!   and its own current-thread runtime.
//! - A sticky dispatcher: the outermost `run` on a task acquires a worker and
//!   pins the task to it through a task-local dispatch handle; nested calls
//!   find the handle and execute inline on the same thread.
//! - A transaction facade that routes blocking-mode transactions through the
//!   dispatcher, so everything from begin to commit happens on one thread,
//!   and normalizes errors surfaced across the reactive/blocking bridge.
//! - A metadata adapter deriving pool sizing and timeouts from whatever
//!   connection-pool product the query source sits on.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use turnstile::builders::DispatcherBuilder;
//! use turnstile::config::DispatcherConfig;
//! use turnstile::sql::{QuerySource, SqlClient};
//!
//! # fn source() -> QuerySource { unimplemented!() }
//! # async fn demo() -> turnstile::Result<()> {
//! let dispatcher = DispatcherBuilder::new("db", DispatcherConfig::default()).build()?;
//! let client = SqlClient::new(source(), dispatcher);
//!
//! client
//!     .transaction(|trx| async move {
//!         // Every call here runs on the same worker thread, even across
//!         // suspension points.
//!         # let _ = trx;
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Builders to construct dispatchers from configuration.
pub mod builders;
/// Configuration models for the dispatcher and pool metadata.
pub mod config;
/// Worker pool, sticky dispatcher, and the shared error taxonomy.
pub mod core;
/// Host runtime integration.
pub mod runtime;
/// Transaction facade, record operations, and result-shape helpers.
pub mod sql;
/// Shared utilities.
pub mod util;

pub use crate::core::{Error, Result};
