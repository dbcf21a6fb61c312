//! Connection registry, instrumented proxy and the facade over both
//!
//! - [`Monitor`]: weak registry of live connections, collector set, sweep task
//! - [`InstrumentedConnection`]: `AsyncRead + AsyncWrite` proxy feeding the monitor
//! - [`ConnectionMonitor`]: provider-backed entry point handing out proxies

mod connection;
mod facade;
mod registry;
mod sync;

pub use connection::InstrumentedConnection;
pub use facade::{Builder, ConnectionMonitor};
pub use registry::{Monitor, SweepReport};
