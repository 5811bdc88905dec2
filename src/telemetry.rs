//! Telemetry utilities for timing long-running operations.

use std::time::Instant;
use tracing::debug;

/// Guard for timing an operation.
///
/// Logs the elapsed time when dropped.
pub struct OpTimer {
    op: &'static str,
    start: Instant,
}

impl OpTimer {
    /// Start timing an operation.
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }
}

impl Drop for OpTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        debug!(op = self.op, elapsed_ms, "Operation finished");
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one expiration sweep.
    pub fn sweep() -> Span {
        info_span!("expire")
    }

    /// Span for writing or reading a snapshot.
    pub fn snapshot(op: &str, path: &str) -> Span {
        info_span!("snapshot", op = %op, path = %path)
    }
}
