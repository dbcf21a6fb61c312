use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

use connection_monitor::args::Args;
use connection_monitor::config::{ProviderConfig, load_config, load_config_from_env};
use connection_monitor::types::SweepInterval;
use connection_monitor::{
    ByteCountCollector, ByteCounts, ConnectionMonitor, MonitorConfig, ValidationError,
    init_logging,
};

/// How long to wait for the peer's reply before reporting anyway
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref());

    let config = resolve_config(&args)?;
    let provider_config = resolve_provider(&args, &config)?;
    let provider = Arc::new(provider_config.build());

    info!(
        host = %provider_config.host,
        port = %provider_config.port,
        interval = %config.sweep_interval,
        checkers = config.checkers().len(),
        "Starting connection monitor"
    );

    let collector = Arc::new(ByteCountCollector::default());
    let monitor = ConnectionMonitor::builder(provider.clone())
        .config(&config)
        .collector(collector.clone())
        .build();

    let mut conn = monitor
        .get()
        .await
        .inspect_err(|e| {
            if e.is_network_error() {
                warn!(
                    host = %provider_config.host,
                    port = %provider_config.port,
                    "Peer unreachable, check --host/--port or the [provider] section"
                );
            }
        })
        .context("Failed to open connection")?;

    conn.write_all(args.message.as_bytes()).await?;
    conn.flush().await?;

    let mut reply = vec![0u8; 4096];
    match tokio::time::timeout(REPLY_TIMEOUT, conn.read(&mut reply)).await {
        Ok(Ok(0)) => info!(connection = %conn.id(), "Peer closed the connection"),
        Ok(Ok(n)) => info!(
            connection = %conn.id(),
            bytes = n,
            reply = %String::from_utf8_lossy(&reply[..n]).trim_end(),
            "Received reply"
        ),
        Ok(Err(e)) => warn!(connection = %conn.id(), error = %e, "Read failed"),
        Err(_) => warn!(connection = %conn.id(), timeout = ?REPLY_TIMEOUT, "No reply"),
    }

    let stats = conn.stats();
    let counts = conn
        .with_metric::<ByteCounts, _>(ByteCountCollector::DEFAULT_NAME, |c| *c)
        .unwrap_or_default();
    info!(
        connection = %conn.id(),
        read = stats.total_read,
        written = stats.total_write,
        collector_total = counts.total(),
        age = ?stats.age(std::time::Instant::now()),
        "Connection statistics"
    );

    drop(conn);
    let report = monitor.monitor().sweep();
    info!(
        reclaimed = report.reclaimed,
        live_metric_values = collector.live_count(),
        opened = provider.opened_count(),
        "Connection released"
    );

    monitor.provider().stop();
    monitor.shutdown().await;
    Ok(())
}

/// Load the config file if present, else defaults plus environment
fn resolve_config(args: &Args) -> Result<MonitorConfig> {
    let path = args.config.as_str();
    let mut config = if std::path::Path::new(path).exists() {
        load_config(path)?
    } else {
        warn!("Config file '{}' not found, using defaults and environment", path);
        load_config_from_env()?
    };

    if let Some(millis) = args.sweep_interval_ms {
        config.sweep_interval = SweepInterval::from_millis(millis)
            .ok_or(ValidationError::ZeroSweepInterval)
            .context("Invalid --sweep-interval-ms")?;
    }
    Ok(config)
}

/// Combine the `[provider]` section with command-line overrides
fn resolve_provider(args: &Args, config: &MonitorConfig) -> Result<ProviderConfig> {
    let section = config.provider.as_ref();
    let host = args
        .effective_host(section.map(|p| &p.host))
        .context("No host given: pass --host or set [provider] host in the config file")?;
    let port = args
        .effective_port(section.map(|p| p.port))
        .context("No port given: pass --port or set [provider] port in the config file")?;

    let mut provider = section
        .cloned()
        .unwrap_or_else(|| ProviderConfig::new(host.clone(), port));
    provider.host = host;
    provider.port = port;
    Ok(provider)
}
