//! Errors reported when a monitored connection cannot be obtained
//!
//! Read/write failures on an established connection are never wrapped here:
//! they reach the caller as the transport's own `io::Error`.

use std::fmt;

/// Errors that can occur while acquiring a connection from a provider
#[derive(Debug)]
#[non_exhaustive]
pub enum ConnectionError {
    /// TCP connection failed
    TcpConnect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// The provider was stopped and no longer produces connections
    ProviderStopped { provider: String },

    /// I/O error while setting up the connection
    IoError(std::io::Error),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TcpConnect { host, port, source } => {
                write!(f, "Failed to connect to {}:{}: {}", host, port, source)
            }
            Self::ProviderStopped { provider } => {
                write!(f, "Connection provider '{}' has been stopped", provider)
            }
            Self::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TcpConnect { source, .. } => Some(source),
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl ConnectionError {
    /// Check if this is a network connectivity error
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::TcpConnect { .. })
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_tcp_connect_error() {
        let err = ConnectionError::TcpConnect {
            host: "example.com".to_string(),
            port: 5432,
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };

        let msg = err.to_string();
        assert!(msg.contains("example.com"));
        assert!(msg.contains("5432"));
        assert!(msg.contains("refused"));
        assert!(err.source().is_some());
        assert!(err.is_network_error());
    }

    #[test]
    fn test_provider_stopped_error() {
        let err = ConnectionError::ProviderStopped {
            provider: "backend2".to_string(),
        };

        assert!(err.to_string().contains("stopped"));
        assert!(err.source().is_none());
        assert!(!err.is_network_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
        let conn_err: ConnectionError = io_err.into();

        assert!(matches!(conn_err, ConnectionError::IoError(_)));
        assert!(conn_err.source().is_some());
    }
}
