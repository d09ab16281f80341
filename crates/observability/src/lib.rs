//! Process-wide tracing setup shared by every binary.

pub mod tracing;

pub use crate::tracing::{LogFormat, TracingConfig};

/// Initialize tracing with defaults (`info`, JSON), overridable via `RUST_LOG`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    crate::tracing::init(&TracingConfig::default());
}
