//! Public entry point tying a provider to a monitor

use super::connection::InstrumentedConnection;
use super::registry::Monitor;
use crate::config::MonitorConfig;
use crate::connection_error::ConnectionError;
use crate::metrics::{ConnectionChecker, StatCollector};
use crate::provider::ConnectionProvider;
use crate::types::SweepInterval;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hands out instrumented connections from one provider
///
/// Owns a [`Monitor`] whose sweep task runs until [`stop`](Self::stop),
/// [`shutdown`](Self::shutdown) or drop. Connections already handed out keep
/// working after that; they are simply no longer swept.
///
/// ```no_run
/// # use connection_monitor::{ConnectionMonitor, ByteCountCollector, TcpConnectionProvider};
/// # use connection_monitor::types::{HostName, Port};
/// # use std::sync::Arc;
/// # async fn demo() -> anyhow::Result<()> {
/// let provider = TcpConnectionProvider::builder(
///     HostName::new("localhost".to_string())?,
///     Port::try_from(7000)?,
/// )
/// .build();
/// let monitor = ConnectionMonitor::builder(Arc::new(provider))
///     .collector(Arc::new(ByteCountCollector::default()))
///     .build();
/// let conn = monitor.get().await?;
/// # drop(conn);
/// # Ok(())
/// # }
/// ```
pub struct ConnectionMonitor {
    monitor: Arc<Monitor>,
    provider: Arc<dyn ConnectionProvider>,
}

impl ConnectionMonitor {
    /// Monitor `provider` with the default sweep interval
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self::builder(provider).build()
    }

    /// Start configuring a monitor for `provider`
    pub fn builder(provider: Arc<dyn ConnectionProvider>) -> Builder {
        Builder::new(provider)
    }

    /// Get a connection from the provider and instrument it
    pub async fn get(&self) -> Result<InstrumentedConnection, ConnectionError> {
        let stream = self.provider.get().await?;
        let conn = InstrumentedConnection::new(self.monitor.clone(), self.provider.clone(), stream);
        debug!(
            connection = %conn.id(),
            provider = %self.provider.properties().name,
            "Connection instrumented"
        );
        Ok(conn)
    }

    /// See [`Monitor::add_stat_collector`]
    pub fn add_stat_collector(
        &self,
        collector: Arc<dyn StatCollector>,
    ) -> Option<Arc<dyn StatCollector>> {
        self.monitor.add_stat_collector(collector)
    }

    /// See [`Monitor::remove_stat_collector`]
    pub fn remove_stat_collector(&self, name: &str) -> Option<Arc<dyn StatCollector>> {
        self.monitor.remove_stat_collector(name)
    }

    /// See [`Monitor::add_checker`]
    pub fn add_checker(&self, checker: Arc<dyn ConnectionChecker>) {
        self.monitor.add_checker(checker);
    }

    /// Stop the sweep task without waiting for it
    pub fn stop(&self) {
        self.monitor.stop();
    }

    /// Stop the sweep task and wait for it to exit
    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
    }

    /// Registry behind this facade
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Provider connections are obtained from
    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("monitor", &self.monitor)
            .field("provider", &self.provider)
            .finish()
    }
}

/// Builder for [`ConnectionMonitor`]
///
/// Collectors and checkers from [`config`](Self::config) and from explicit
/// calls are all registered; an explicit
/// [`sweep_interval`](Self::sweep_interval) wins over the configured one
/// when called after it.
pub struct Builder {
    provider: Arc<dyn ConnectionProvider>,
    sweep_interval: SweepInterval,
    collectors: Vec<Arc<dyn StatCollector>>,
    checkers: Vec<Arc<dyn ConnectionChecker>>,
}

impl Builder {
    fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            sweep_interval: SweepInterval::default(),
            collectors: Vec::new(),
            checkers: Vec::new(),
        }
    }

    /// Take the sweep interval and checkers from `config`
    #[must_use]
    pub fn config(mut self, config: &MonitorConfig) -> Self {
        self.sweep_interval = config.sweep_interval;
        self.checkers.extend(config.checkers());
        self
    }

    /// Pause between sweep passes, rounded up to whole milliseconds
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = SweepInterval::from_duration(interval);
        self
    }

    #[must_use]
    pub fn collector(mut self, collector: Arc<dyn StatCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    #[must_use]
    pub fn checker(mut self, checker: Arc<dyn ConnectionChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Start the monitor
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> ConnectionMonitor {
        let monitor = Monitor::new(self.sweep_interval);
        for collector in self.collectors {
            monitor.add_stat_collector(collector);
        }
        for checker in self.checkers {
            monitor.add_checker(checker);
        }

        ConnectionMonitor {
            monitor,
            provider: self.provider,
        }
    }
}
