//! Connection providers
//!
//! A provider produces the raw connections a
//! [`ConnectionMonitor`](crate::monitor::ConnectionMonitor) instruments, and takes
//! them back when an instrumented connection is invalidated.

mod connection_trait;
mod tcp;

pub use connection_trait::{ConnectionProvider, ProviderProperties};
pub use tcp::{Builder, TcpConnectionProvider};
