//! Command-line arguments for the `connmon` binary

use crate::types::{ConfigPath, HostName, Port};
use clap::Parser;

/// Parse port from command line argument
fn parse_port(s: &str) -> Result<Port, String> {
    let port: u16 = s
        .parse()
        .map_err(|e| format!("Invalid port number: {}", e))?;
    Port::try_from(port).map_err(|e| format!("Invalid port: {}", e))
}

/// Open a monitored TCP connection, exchange one message and report its statistics
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host to connect to (overrides config file)
    #[arg(long, env = "CONNMON_HOST")]
    pub host: Option<HostName>,

    /// Port to connect to (overrides config file)
    #[arg(short, long, env = "CONNMON_PORT", value_parser = parse_port)]
    pub port: Option<Port>,

    /// Configuration file path
    #[arg(short, long, default_value = "connmon.toml", env = "CONNMON_CONFIG")]
    pub config: ConfigPath,

    /// Payload to send once connected
    #[arg(short, long, default_value = "PING\r\n")]
    pub message: String,

    /// Also write logs to this file
    #[arg(long, env = "CONNMON_LOG_FILE")]
    pub log_file: Option<String>,

    /// Sweep interval in milliseconds (overrides config file and environment)
    #[arg(long)]
    pub sweep_interval_ms: Option<u64>,
}

impl Args {
    /// Host from the command line, else from config
    #[must_use]
    pub fn effective_host(&self, config_host: Option<&HostName>) -> Option<HostName> {
        self.host.clone().or_else(|| config_host.cloned())
    }

    /// Port from the command line, else from config
    #[must_use]
    pub fn effective_port(&self, config_port: Option<Port>) -> Option<Port> {
        self.port.or(config_port)
    }
}
