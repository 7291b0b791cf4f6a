//! Error types for dispatcher and facade operations.

use std::time::Duration;

use thiserror::Error;

/// Message carried by the wrapper inserted around a cause that forced a
/// transaction rollback.
pub const ROLLBACK_CAUSED: &str = "Rollback caused";

/// Message carried by the wrapper inserted when blocking on a reactive
/// publisher fails.
pub const BLOCKING_ON_PUBLISHER: &str = "Exception when blocking on publisher";

/// Errors produced by the dispatcher pool and the SQL facade.
#[derive(Debug, Error)]
pub enum Error {
    /// No worker became available within the configured acquire timeout.
    #[error("timed out acquiring a worker after {timeout:?}")]
    AcquireTimeout {
        /// The configured acquire timeout that elapsed.
        timeout: Duration,
        /// The host cancellation that ended the wait.
        #[source]
        source: tokio::time::error::Elapsed,
    },

    /// The dispatcher pool has been closed.
    #[error("dispatcher pool is closed")]
    PoolClosed,

    /// The metadata adapter did not recognize the connection-pool product.
    #[error("unsupported connection pool type: {0}")]
    UnknownPoolType(String),

    /// A data-access wrapper. Carries an optional cause; bare wrappers with a
    /// sentinel message are peeled off by [`unwrap_data_access`].
    #[error("{message}")]
    DataAccess {
        /// Wrapper message.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<Error>>,
    },

    /// An error reported by the underlying driver. Terminal for unwrapping.
    #[error("{0}")]
    Driver(String),

    /// The dispatched block was cancelled before producing a result.
    #[error("dispatched block was cancelled")]
    Cancelled,

    /// Internal sentinel requesting that the surrounding transaction roll
    /// back. Surfaced as-is, never wrapped.
    #[error("transaction rollback requested")]
    RollbackRequested,

    /// A result-shape helper observed a second row.
    #[error("More than one record match the condition")]
    MoreThanOneRecord,

    /// A result-shape helper that requires a row observed none.
    #[error("No records match the condition")]
    NoRecordsMatch,

    /// A field that must not be null was null.
    #[error("unexpected null value for field {field}")]
    UnexpectedNullField {
        /// Qualified name of the offending field.
        field: String,
    },

    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build a bare data-access wrapper around a cause.
    pub fn data_access(message: impl Into<String>, source: Error) -> Self {
        Self::DataAccess {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    fn is_sentinel_wrapper(&self) -> bool {
        matches!(
            self,
            Self::DataAccess { message, .. }
                if message == ROLLBACK_CAUSED || message == BLOCKING_ON_PUBLISHER
        )
    }
}

/// Convenient result alias for fallible operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = std::result::Result<T, anyhow::Error>;

/// Normalize an error surfaced across the reactive/blocking bridge.
///
/// While the error is a bare data-access wrapper whose message is one of the
/// sentinel strings, unwrap one level. Stops at a real driver error or at a
/// missing cause. A sentinel wrapper with no cause re-raises as a fresh
/// wrapper carrying the original.
pub fn unwrap_data_access(err: Error) -> Error {
    let mut current = err;
    loop {
        if !current.is_sentinel_wrapper() {
            return current;
        }
        match current {
            Error::DataAccess { message, source } => match source {
                Some(inner) => current = *inner,
                None => {
                    return Error::data_access(
                        ROLLBACK_CAUSED,
                        Error::DataAccess {
                            message,
                            source: None,
                        },
                    );
                }
            },
            _ => unreachable!("sentinel wrapper is always DataAccess"),
        }
    }
}
