//! Host runtime integration.

pub mod lifecycle;

pub use lifecycle::LifecycleBinding;
