//! Process-wide tracing setup shared by the binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogFormat, TracingConfig};

/// Initialize tracing with the default configuration (`info`, JSON).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&TracingConfig::default());
}

/// Initialize tracing with an explicit configuration.
pub fn init_with(config: &TracingConfig) {
    tracing::init(config);
}
