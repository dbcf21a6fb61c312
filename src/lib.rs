//! # connection-monitor
//!
//! Per-connection traffic statistics for tokio streams.
//!
//! A [`ConnectionMonitor`] takes connections from a [`ConnectionProvider`] and
//! hands them out wrapped in an [`InstrumentedConnection`]. Every completed
//! read and write updates that connection's counters and is reported to the
//! registered [`StatCollector`]s, each of which keeps its own opaque state per
//! connection.
//!
//! The monitor holds connections only weakly. Dropping a connection is all
//! the application has to do; a background sweep notices and deletes the
//! collector state left behind. Optional [`ConnectionChecker`]s let the same
//! sweep invalidate connections that are idle or too old.
//!
//! ## Modules
//!
//! - [`metrics`]: connection stats, the collector and checker traits
//! - [`monitor`]: registry, sweep task, instrumented proxy and facade
//! - [`provider`]: where raw connections come from
//! - [`stream`]: the duplex stream abstraction providers produce
//! - [`config`]: TOML configuration with environment overrides

pub mod args;
pub mod config;
pub mod connection_error;
pub mod constants;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod provider;
pub mod stream;
pub mod types;

pub use config::{MonitorConfig, create_default_config, load_config};
pub use connection_error::ConnectionError;
pub use logging::init_logging;
pub use metrics::{
    ByteCountCollector, ByteCounts, ConnectionChecker, ConnectionStats, InactivityChecker,
    IoOutcome, MaxAgeChecker, MetricData, StatCollector, StatsSnapshot,
};
pub use monitor::{ConnectionMonitor, InstrumentedConnection, Monitor, SweepReport};
pub use provider::{ConnectionProvider, ProviderProperties, TcpConnectionProvider};
pub use stream::{Connection, ConnectionStream, Direction, IoMode, StreamContext};
pub use types::{ConnectionId, ValidationError};
