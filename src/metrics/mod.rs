//! Connection statistics and the pluggable metric protocol
//!
//! - [`ConnectionStats`]: counters and collector state of one connection
//! - [`StatCollector`]: named collector creating and updating per-connection state
//! - [`ConnectionChecker`]: predicate the sweep uses to end a connection's life

mod byte_count;
mod checker;
mod collector;
mod snapshot;
mod stats;

pub use byte_count::{ByteCountCollector, ByteCounts};
pub use checker::{ConnectionChecker, InactivityChecker, MaxAgeChecker};
pub use collector::{MetricData, StatCollector, metric_as, metric_as_mut};
pub use snapshot::StatsSnapshot;
pub use stats::{ConnectionStats, IoOutcome};
