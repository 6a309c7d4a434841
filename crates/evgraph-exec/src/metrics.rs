//! Metrics/tracing hooks.
//!
//! No telemetry stack is pulled in here; the binary layer decides where
//! spans go. `PassCounter` is the one counter tests rely on: every
//! partition pass a worker starts is recorded exactly once.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "tracing")]
pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "evgraph", event);
    let _enter = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}

#[cfg(not(feature = "tracing"))]
pub fn emit_span(_event: &str, _key_values: &[(&str, String)]) { /* no-op */
}

/// Number of partition passes started.
#[derive(Debug, Default)]
pub struct PassCounter {
    passes: AtomicU64,
}

impl PassCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Reset to zero and return the previous count.
    pub fn take(&self) -> u64 {
        self.passes.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_resets() {
        let c = PassCounter::new();
        c.record();
        c.record();
        assert_eq!(c.get(), 2);
        assert_eq!(c.take(), 2);
        assert_eq!(c.get(), 0);
        emit_span("noop", &[("k", "v".to_string())]);
    }
}
