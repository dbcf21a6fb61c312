//! Per-connection traffic statistics

use super::collector::MetricData;
use super::snapshot::StatsSnapshot;
use std::collections::HashMap;
use std::io;
use std::time::Instant;

/// Result of one completed read or write, as seen by statistics and collectors
///
/// A poll that returned `Poll::Pending` is not an outcome: nothing was
/// transferred, so nothing is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    /// `n` bytes were read or written
    Transferred(usize),
    /// The peer closed its write half (reads only)
    EndOfStream,
    /// The transport reported an error; it is returned to the caller unchanged
    Failed(io::ErrorKind),
}

impl IoOutcome {
    /// Bytes moved by this outcome
    #[must_use]
    #[inline]
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Transferred(n) => *n,
            Self::EndOfStream | Self::Failed(_) => 0,
        }
    }

    /// Whether this outcome advances counters and timestamps
    #[must_use]
    #[inline]
    pub const fn is_definite(&self) -> bool {
        matches!(self, Self::Transferred(_) | Self::EndOfStream)
    }
}

/// Live statistics of one instrumented connection
///
/// Owned by the connection that created it and always accessed under that
/// connection's stats lock. `metric_data` holds one opaque value per collector
/// that has observed this connection; values are only ever created and
/// destroyed by their collector.
pub struct ConnectionStats {
    created_at: Instant,
    total_read: u64,
    total_write: u64,
    last_read_at: Option<Instant>,
    last_write_at: Option<Instant>,
    last_read_size: usize,
    last_write_size: usize,
    metric_data: HashMap<String, MetricData>,
    /// Set once collector state has been freed; no new state is created after
    released: bool,
}

impl ConnectionStats {
    #[must_use]
    pub fn new(created_at: Instant) -> Self {
        Self {
            created_at,
            total_read: 0,
            total_write: 0,
            last_read_at: None,
            last_write_at: None,
            last_read_size: 0,
            last_write_size: 0,
            metric_data: HashMap::new(),
            released: false,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    #[must_use]
    pub fn total_write(&self) -> u64 {
        self.total_write
    }

    #[must_use]
    pub fn last_read_at(&self) -> Option<Instant> {
        self.last_read_at
    }

    #[must_use]
    pub fn last_write_at(&self) -> Option<Instant> {
        self.last_write_at
    }

    #[must_use]
    pub fn last_read_size(&self) -> usize {
        self.last_read_size
    }

    #[must_use]
    pub fn last_write_size(&self) -> usize {
        self.last_write_size
    }

    /// Collector state stored under `name`, if that collector has seen this connection
    #[must_use]
    pub fn metric_data(&self, name: &str) -> Option<&MetricData> {
        self.metric_data.get(name)
    }

    /// Names of the collectors currently holding state for this connection
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metric_data.keys().map(String::as_str)
    }

    /// Whether collector state has been freed for good
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Record a completed read; returns true if counters changed
    pub fn record_read(&mut self, outcome: IoOutcome, now: Instant) -> bool {
        match outcome {
            IoOutcome::Transferred(n) => {
                self.total_read += n as u64;
                self.last_read_size = n;
                self.last_read_at = Some(now);
                true
            }
            IoOutcome::EndOfStream => {
                self.last_read_size = 0;
                self.last_read_at = Some(now);
                true
            }
            IoOutcome::Failed(_) => false,
        }
    }

    /// Record a completed write; returns true if counters changed
    pub fn record_write(&mut self, outcome: IoOutcome, now: Instant) -> bool {
        match outcome {
            IoOutcome::Transferred(n) => {
                self.total_write += n as u64;
                self.last_write_size = n;
                self.last_write_at = Some(now);
                true
            }
            // Not produced by writes, but it is still a definite outcome
            IoOutcome::EndOfStream => {
                self.last_write_size = 0;
                self.last_write_at = Some(now);
                true
            }
            IoOutcome::Failed(_) => false,
        }
    }

    /// Copy of the counters, without collector state
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut metric_names: Vec<String> = self.metric_data.keys().cloned().collect();
        metric_names.sort_unstable();

        StatsSnapshot {
            created_at: self.created_at,
            total_read: self.total_read,
            total_write: self.total_write,
            last_read_at: self.last_read_at,
            last_write_at: self.last_write_at,
            last_read_size: self.last_read_size,
            last_write_size: self.last_write_size,
            metric_names,
        }
    }

    /// Get the state for `name`, creating it with `create` on first use
    ///
    /// Returns None once the stats have been released.
    pub(crate) fn metric_data_or_create(
        &mut self,
        name: &str,
        create: impl FnOnce() -> MetricData,
    ) -> Option<&mut MetricData> {
        if self.released {
            return None;
        }
        if !self.metric_data.contains_key(name) {
            self.metric_data.insert(name.to_string(), create());
        }
        self.metric_data.get_mut(name)
    }

    pub(crate) fn remove_metric_data(&mut self, name: &str) -> Option<MetricData> {
        self.metric_data.remove(name)
    }

    /// Mark released and hand back every collector value for deletion
    pub(crate) fn release(&mut self) -> Vec<(String, MetricData)> {
        self.released = true;
        self.metric_data.drain().collect()
    }
}

impl std::fmt::Debug for ConnectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStats")
            .field("created_at", &self.created_at)
            .field("total_read", &self.total_read)
            .field("total_write", &self.total_write)
            .field("last_read_at", &self.last_read_at)
            .field("last_write_at", &self.last_write_at)
            .field("last_read_size", &self.last_read_size)
            .field("last_write_size", &self.last_write_size)
            .field("metric_data", &self.metric_data.keys().collect::<Vec<_>>())
            .field("released", &self.released)
            .finish()
    }
}
