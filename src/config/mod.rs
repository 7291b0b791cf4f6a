//! Configuration models for the dispatcher and pool metadata.

pub mod dispatcher;
pub mod metadata;

pub use dispatcher::{
    DispatcherConfig, DispatcherSettings, HandoffOrder, DEFAULT_ACQUIRE_TIMEOUT,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_POOL_SIZE,
};
pub use metadata::{
    derive_pool_settings, DbcpFacet, HikariFacet, PoolProduct, PoolSettings, ProxyFacet,
    TomcatFacet, UcpFacet,
};
