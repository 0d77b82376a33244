//! One-shot diagnostics for out-of-range geometry.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Reports "geometry exceeds extent" at most once.
///
/// Degenerate tiles can carry thousands of out-of-range coordinates; only the
/// first one is logged. Share one instance (via `Arc`) between every
/// quantizer that should be deduplicated together, typically the whole
/// worker pool.
#[derive(Debug, Default)]
pub struct ExtentDiagnostics {
    warned: AtomicBool,
}

impl ExtentDiagnostics {
    /// Creates a diagnostics instance that has not warned yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an out-of-range coordinate.
    ///
    /// Returns true if this call emitted the warning.
    pub fn report_exceeded(&self) -> bool {
        if self.warned.swap(true, Ordering::AcqRel) {
            return false;
        }
        warn!("Geometry exceeds allowed extent, reduce your vector tile buffer size");
        true
    }

    /// Returns true once the warning has been emitted.
    pub fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Acquire)
    }
}
