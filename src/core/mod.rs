//! Worker pool, sticky dispatcher, and the shared error taxonomy.

pub mod dispatcher;
pub mod error;
pub mod events;
pub(crate) mod pool;
pub(crate) mod worker;

pub use dispatcher::{
    current_dispatch, DispatchHandle, Dispatcher, PassthroughDispatcher, StickyDispatcher,
};
pub use error::{
    unwrap_data_access, AppResult, Error, Result, BLOCKING_ON_PUBLISHER, ROLLBACK_CAUSED,
};
pub use events::{AcquisitionEvent, AcquisitionListener, LogListener};
