//! TCP client connection provider
//!
//! Dials a fixed `host:port` for every [`get`](ConnectionProvider::get) call and
//! wraps the socket in a [`ConnectionStream`] whose context records the socket
//! addresses.

use super::connection_trait::{ConnectionProvider, ProviderProperties};
use crate::connection_error::ConnectionError;
use crate::constants::provider::CONNECT_TIMEOUT;
use crate::stream::{Connection, ConnectionStream};
use crate::types::{HostName, Port};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Provider that opens a fresh TCP connection per request
#[derive(Debug)]
pub struct TcpConnectionProvider {
    host: HostName,
    port: Port,
    name: String,
    connect_timeout: Duration,
    stopped: AtomicBool,
    opened: AtomicU64,
    invalidated: AtomicU64,
}

/// Builder for [`TcpConnectionProvider`]
///
/// # Examples
///
/// ```no_run
/// use connection_monitor::provider::TcpConnectionProvider;
/// use connection_monitor::types::{HostName, Port};
/// use std::time::Duration;
///
/// let provider = TcpConnectionProvider::builder(
///     HostName::new("db.internal".to_string()).unwrap(),
///     Port::new(5432).unwrap(),
/// )
/// .name("primary")
/// .connect_timeout(Duration::from_secs(3))
/// .build();
/// ```
pub struct Builder {
    host: HostName,
    port: Port,
    name: Option<String>,
    connect_timeout: Duration,
}

impl Builder {
    #[must_use]
    pub fn new(host: HostName, port: Port) -> Self {
        Self {
            host,
            port,
            name: None,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Set a friendly name for logging (defaults to "host:port")
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Upper bound on how long a single dial may take
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> TcpConnectionProvider {
        let name = self
            .name
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port));

        TcpConnectionProvider {
            host: self.host,
            port: self.port,
            name,
            connect_timeout: self.connect_timeout,
            stopped: AtomicBool::new(false),
            opened: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }
}

impl TcpConnectionProvider {
    #[must_use]
    pub fn builder(host: HostName, port: Port) -> Builder {
        Builder::new(host, port)
    }

    /// Number of connections successfully opened so far
    #[must_use]
    pub fn opened_count(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Number of connections handed back through `invalidate`
    #[must_use]
    pub fn invalidated_count(&self) -> u64 {
        self.invalidated.load(Ordering::Relaxed)
    }

    fn connect_error(&self, source: std::io::Error) -> ConnectionError {
        ConnectionError::TcpConnect {
            host: self.host.to_string(),
            port: self.port.get(),
            source,
        }
    }
}

#[async_trait]
impl ConnectionProvider for TcpConnectionProvider {
    async fn get(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ConnectionError::ProviderStopped {
                provider: self.name.clone(),
            });
        }

        let address = (self.host.as_str(), self.port.get());
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                self.connect_error(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no connection after {:?}", self.connect_timeout),
                ))
            })?
            .map_err(|e| self.connect_error(e))?;

        stream.set_nodelay(true)?;
        self.opened.fetch_add(1, Ordering::Relaxed);
        debug!(provider = %self.name, peer = ?stream.peer_addr().ok(), "Opened TCP connection");

        Ok(Box::new(ConnectionStream::tcp(stream)))
    }

    fn invalidate(&self, mut connection: Box<dyn Connection>) {
        self.invalidated.fetch_add(1, Ordering::Relaxed);
        debug!(provider = %self.name, "Closing invalidated TCP connection");

        // Outside a runtime the socket is simply dropped.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = connection.shutdown().await;
            });
        }
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            info!(provider = %self.name, "TCP connection provider stopped");
        }
    }

    fn properties(&self) -> ProviderProperties {
        ProviderProperties::new(self.name.clone())
            .with_address(format!("{}:{}", self.host, self.port))
    }
}
