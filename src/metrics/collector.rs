//! Pluggable per-connection metric collectors
//!
//! A collector is registered once with a monitor and then observes every
//! connection that monitor instruments. For each connection it owns one opaque
//! [`MetricData`] value, stored in that connection's stats under the
//! collector's name.

use super::stats::IoOutcome;
use std::any::Any;
use std::time::Instant;

/// Opaque per-connection state owned by a collector
pub type MetricData = Box<dyn Any + Send>;

/// Contract for a named, pluggable metric
///
/// One instance serves every connection; anything connection-specific lives
/// in the `MetricData` it creates. Callbacks run with the connection's stats
/// lock held, so they must be quick, must not block, and must not call back
/// into the monitor.
pub trait StatCollector: Send + Sync {
    /// Stable name, used as the key for this collector's state
    fn metric_name(&self) -> &str;

    /// Fresh state for a connection with no activity yet
    ///
    /// Called lazily, at most once per connection.
    fn create_metric_data(&self) -> MetricData;

    /// Release state created by [`create_metric_data`](Self::create_metric_data)
    ///
    /// Called exactly once per created value.
    fn delete_metric_data(&self, data: MetricData) {
        drop(data);
    }

    /// Observe a completed read
    fn on_read(&self, data: &mut MetricData, outcome: IoOutcome, timestamp: Instant);

    /// Observe a completed write
    fn on_write(&self, data: &mut MetricData, outcome: IoOutcome, timestamp: Instant);
}

impl std::fmt::Debug for dyn StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatCollector")
            .field("metric_name", &self.metric_name())
            .finish_non_exhaustive()
    }
}

/// Downcast collector state to its concrete type
#[must_use]
#[inline]
pub fn metric_as<T: Any>(data: &MetricData) -> Option<&T> {
    data.downcast_ref::<T>()
}

/// Mutable variant of [`metric_as`]
#[must_use]
#[inline]
pub fn metric_as_mut<T: Any>(data: &mut MetricData) -> Option<&mut T> {
    data.downcast_mut::<T>()
}
