//! Builder constructing dispatchers from configuration.

use std::sync::Arc;

use crate::config::{DispatcherConfig, PoolProduct};
use crate::core::dispatcher::{Dispatcher, PassthroughDispatcher, StickyDispatcher};
use crate::core::error::Result;
use crate::core::events::{AcquisitionListener, LogListener};

/// Builds a [`Dispatcher`] from configuration, optional connection-pool
/// metadata, and listeners.
pub struct DispatcherBuilder {
    name: String,
    config: DispatcherConfig,
    product: Option<Arc<dyn PoolProduct>>,
    listeners: Vec<Arc<dyn AcquisitionListener>>,
}

impl DispatcherBuilder {
    /// Start a builder for a named dispatcher.
    pub fn new(name: impl Into<String>, config: DispatcherConfig) -> Self {
        Self {
            name: name.into(),
            config,
            product: None,
            listeners: Vec::new(),
        }
    }

    /// Supply the connection-pool product backing the query source; unset
    /// configuration fields are derived from it.
    pub fn metadata_from(mut self, product: Arc<dyn PoolProduct>) -> Self {
        self.product = Some(product);
        self
    }

    /// Install an acquisition listener.
    pub fn listener(mut self, listener: Arc<dyn AcquisitionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build the dispatcher.
    ///
    /// A disabled configuration yields the pass-through variant. When an
    /// acquire threshold is configured without any listener, the default
    /// logging listener is installed.
    pub fn build(self) -> Result<Dispatcher> {
        if !self.config.enabled {
            return Ok(Dispatcher::Passthrough(PassthroughDispatcher::new()));
        }
        let settings = self.config.resolve(self.product.as_deref())?;
        let mut listeners = self.listeners;
        if settings.acquire_threshold.is_some() && listeners.is_empty() {
            listeners.push(Arc::new(LogListener));
        }
        Ok(Dispatcher::Sticky(StickyDispatcher::new(
            self.name, settings, listeners,
        )))
    }
}
