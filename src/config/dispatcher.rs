//! Dispatcher configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::metadata::{derive_pool_settings, PoolProduct};
use crate::core::error::{Error, Result};

/// Fallback pool size when neither configuration nor pool metadata supply one.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Fallback worker idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Fallback worker acquire timeout.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Order in which released workers are handed back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffOrder {
    /// Stack discipline: the most recently released worker goes out first.
    /// Favors cache and thread-local warmth.
    #[default]
    Lifo,
    /// Queue discipline: workers rotate evenly. Pairs well with aggressive
    /// idle-timeout culling.
    Fifo,
}

/// Dispatcher configuration as bound from the operator's settings.
///
/// Unset fields are derived from connection-pool metadata when a pool product
/// is supplied to [`resolve`](Self::resolve), and fall back to the crate
/// defaults otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Whether the sticky dispatcher is enabled. When `false`, the builder
    /// produces the pass-through variant.
    pub enabled: bool,
    /// Number of workers in the pool.
    pub pool_size: Option<usize>,
    /// Idle time after which a worker thread may exit, in milliseconds.
    pub idle_timeout_ms: Option<u64>,
    /// Hard bound on waiting for a worker, in milliseconds.
    pub acquire_timeout_ms: Option<u64>,
    /// Soft latency bound; acquires slower than this emit a threshold event.
    /// Unset disables threshold events.
    pub acquire_threshold_ms: Option<u64>,
    /// Worker handoff ordering.
    pub ordering: HandoffOrder,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pool_size: None,
            idle_timeout_ms: None,
            acquire_timeout_ms: None,
            acquire_threshold_ms: None,
            ordering: HandoffOrder::default(),
        }
    }
}

impl DispatcherConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == Some(0) {
            return Err("pool_size must be greater than 0".into());
        }
        if self.idle_timeout_ms == Some(0) {
            return Err("idle_timeout_ms must be greater than 0".into());
        }
        if self.acquire_timeout_ms == Some(0) {
            return Err("acquire_timeout_ms must be greater than 0".into());
        }
        if self.acquire_threshold_ms == Some(0) {
            return Err("acquire_threshold_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse dispatcher configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: DispatcherConfig =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve into immutable settings.
    ///
    /// The metadata adapter is consulted lazily: only when at least one of
    /// the derivable fields is unset and a pool product is available.
    pub fn resolve(&self, product: Option<&dyn PoolProduct>) -> Result<DispatcherSettings> {
        self.validate().map_err(Error::InvalidConfig)?;

        let needs_metadata = self.pool_size.is_none()
            || self.idle_timeout_ms.is_none()
            || self.acquire_timeout_ms.is_none();
        let derived = match product {
            Some(product) if needs_metadata => Some(derive_pool_settings(product)?),
            _ => None,
        };

        let pool_size = self
            .pool_size
            .or(derived.as_ref().map(|d| d.pool_size))
            .unwrap_or(DEFAULT_POOL_SIZE);
        let idle_timeout = self
            .idle_timeout_ms
            .map(Duration::from_millis)
            .or(derived.as_ref().map(|d| d.idle_timeout))
            .unwrap_or(DEFAULT_IDLE_TIMEOUT);
        let acquire_timeout = self
            .acquire_timeout_ms
            .map(Duration::from_millis)
            .or(derived.as_ref().map(|d| d.acquire_timeout))
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT);

        Ok(DispatcherSettings {
            pool_size,
            idle_timeout,
            acquire_timeout,
            acquire_threshold: self.acquire_threshold_ms.map(Duration::from_millis),
            ordering: self.ordering,
        })
    }
}

/// Immutable, fully-resolved dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Number of workers in the pool.
    pub pool_size: usize,
    /// Idle time after which a worker thread may exit.
    pub idle_timeout: Duration,
    /// Hard bound on waiting for a worker.
    pub acquire_timeout: Duration,
    /// Soft latency bound for threshold events.
    pub acquire_threshold: Option<Duration>,
    /// Worker handoff ordering.
    pub ordering: HandoffOrder,
}
