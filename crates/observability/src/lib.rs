//! Process-wide logging setup shared by campus binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, ObservabilityConfig};

/// Initialize tracing/logging for the process.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &ObservabilityConfig) {
    self::tracing::init(config);
}
