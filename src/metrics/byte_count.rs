//! Collector that mirrors the byte counters of each connection
//!
//! Mostly useful as a reference collector and for diagnostics: its state is
//! the same running totals the connection stats keep, plus a count of the
//! values it has created and deleted.

use super::collector::{MetricData, StatCollector, metric_as_mut};
use super::stats::IoOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-connection state of [`ByteCountCollector`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounts {
    pub read: u64,
    pub written: u64,
}

impl ByteCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.read + self.written
    }
}

/// Counts bytes read and written per connection
#[derive(Debug)]
pub struct ByteCountCollector {
    name: String,
    created: AtomicU64,
    deleted: AtomicU64,
}

impl ByteCountCollector {
    /// Name used by [`Default`]
    pub const DEFAULT_NAME: &'static str = "bytes";

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
        }
    }

    /// Per-connection values created so far
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Per-connection values deleted so far
    #[must_use]
    pub fn deleted_count(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Values created but not yet deleted
    #[must_use]
    pub fn live_count(&self) -> u64 {
        self.created_count().saturating_sub(self.deleted_count())
    }
}

impl Default for ByteCountCollector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

impl StatCollector for ByteCountCollector {
    fn metric_name(&self) -> &str {
        &self.name
    }

    fn create_metric_data(&self) -> MetricData {
        self.created.fetch_add(1, Ordering::Relaxed);
        Box::new(ByteCounts::default())
    }

    fn delete_metric_data(&self, data: MetricData) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
        drop(data);
    }

    fn on_read(&self, data: &mut MetricData, outcome: IoOutcome, _timestamp: Instant) {
        if let Some(counts) = metric_as_mut::<ByteCounts>(data) {
            counts.read += outcome.bytes() as u64;
        }
    }

    fn on_write(&self, data: &mut MetricData, outcome: IoOutcome, _timestamp: Instant) {
        if let Some(counts) = metric_as_mut::<ByteCounts>(data) {
            counts.written += outcome.bytes() as u64;
        }
    }
}
