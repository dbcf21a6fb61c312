//! Configuration type definitions

use super::defaults;
use crate::metrics::{ConnectionChecker, InactivityChecker, MaxAgeChecker};
use crate::provider::TcpConnectionProvider;
use crate::types::{HostName, Port, ProviderName, SweepInterval, millis_serde, option_duration_serde};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Top-level monitor configuration
///
/// ```toml
/// sweep_interval_ms = 500
///
/// [checks]
/// inactivity_timeout_secs = 300
/// max_age_secs = 3600
///
/// [provider]
/// host = "db.internal"
/// port = 5432
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Pause between sweep passes
    #[serde(rename = "sweep_interval_ms", default = "defaults::sweep_interval")]
    pub sweep_interval: SweepInterval,
    /// Conditions under which the sweep invalidates live connections
    #[serde(default)]
    pub checks: ChecksConfig,
    /// TCP endpoint for the `connmon` binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: defaults::sweep_interval(),
            checks: ChecksConfig::default(),
            provider: None,
        }
    }
}

impl MonitorConfig {
    /// Checkers enabled by the `[checks]` section
    #[must_use]
    pub fn checkers(&self) -> Vec<Arc<dyn ConnectionChecker>> {
        let mut checkers: Vec<Arc<dyn ConnectionChecker>> = Vec::new();
        if let Some(max_idle) = self.checks.inactivity_timeout {
            checkers.push(Arc::new(InactivityChecker::new(max_idle)));
        }
        if let Some(max_age) = self.checks.max_age {
            checkers.push(Arc::new(MaxAgeChecker::new(max_age)));
        }
        checkers
    }
}

/// `[checks]` section; every check is off unless configured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// Invalidate connections with no traffic for this long
    #[serde(
        rename = "inactivity_timeout_secs",
        with = "option_duration_serde",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub inactivity_timeout: Option<Duration>,
    /// Invalidate connections older than this
    #[serde(
        rename = "max_age_secs",
        with = "option_duration_serde",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_age: Option<Duration>,
}

/// `[provider]` section: where the TCP provider connects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub host: HostName,
    pub port: Port,
    /// Name used in logs, defaults to `host:port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ProviderName>,
    #[serde(
        rename = "connect_timeout_ms",
        with = "millis_serde",
        default = "defaults::connect_timeout"
    )]
    pub connect_timeout: Duration,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(host: HostName, port: Port) -> Self {
        Self {
            host,
            port,
            name: None,
            connect_timeout: defaults::connect_timeout(),
        }
    }

    /// Build the provider this section describes
    #[must_use]
    pub fn build(&self) -> TcpConnectionProvider {
        let mut builder = TcpConnectionProvider::builder(self.host.clone(), self.port)
            .connect_timeout(self.connect_timeout);
        if let Some(name) = &self.name {
            builder = builder.name(name.as_str());
        }
        builder.build()
    }
}
