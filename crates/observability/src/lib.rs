//! Tracing and logging (shared setup).

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, LogSettings};

/// Initialize process-wide logging with the defaults (`info`, JSON).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(&LogSettings::default());
}

/// Initialize process-wide logging with explicit settings.
pub fn init_with(settings: &LogSettings) {
    self::tracing::init(settings);
}
