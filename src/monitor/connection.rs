//! Instrumented connection proxy

use super::registry::{ConnectionEntry, Monitor, SharedStats};
use super::sync::lock;
use crate::metrics::{ConnectionStats, IoOutcome, StatsSnapshot, metric_as};
use crate::provider::ConnectionProvider;
use crate::stream::{Connection, Direction, IoMode, StreamContext};
use crate::types::ConnectionId;
use std::any::Any;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

/// State shared between a proxy and the weak handle its monitor holds
pub(crate) struct ConnectionCore {
    id: ConnectionId,
    monitor: Arc<Monitor>,
    provider: Arc<dyn ConnectionProvider>,
    /// `None` once invalidated
    stream: Mutex<Option<Box<dyn Connection>>>,
    stats: SharedStats,
}

impl ConnectionCore {
    /// Take the stream back to its provider and free this connection's state
    ///
    /// Returns false if the connection was already invalidated.
    pub(crate) fn invalidate(&self) -> bool {
        let Some(stream) = lock(&self.stream).take() else {
            return false;
        };

        self.provider.invalidate(stream);
        self.monitor.release_connection(self.id, &self.stats);
        debug!(connection = %self.id, "Connection invalidated");
        true
    }

    fn not_connected(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotConnected,
            format!("{} has been invalidated", self.id),
        )
    }

    /// Run `f` against the stream, or fail with `NotConnected`
    fn with_stream<R>(&self, f: impl FnOnce(&mut Box<dyn Connection>) -> R) -> io::Result<R> {
        let mut stream = lock(&self.stream);
        match stream.as_mut() {
            Some(stream) => Ok(f(stream)),
            None => Err(self.not_connected()),
        }
    }
}

/// A connection whose reads and writes are counted and reported to collectors
///
/// Created by [`ConnectionMonitor::get`](super::ConnectionMonitor::get). The
/// monitor only keeps a weak handle, so dropping this value ends the
/// connection; its statistics are reclaimed by the next sweep.
///
/// A poll that returns `Poll::Pending` changes nothing. Errors from the
/// underlying stream are returned unchanged; collectors see them as
/// [`IoOutcome::Failed`] but the counters do not move.
pub struct InstrumentedConnection {
    core: Arc<ConnectionCore>,
}

impl InstrumentedConnection {
    /// Wrap `stream` and register it with `monitor`
    pub fn new(
        monitor: Arc<Monitor>,
        provider: Arc<dyn ConnectionProvider>,
        stream: Box<dyn Connection>,
    ) -> Self {
        let id = ConnectionId::next();
        let stats: SharedStats = Arc::new(Mutex::new(ConnectionStats::new(Instant::now())));
        let core = Arc::new(ConnectionCore {
            id,
            monitor: monitor.clone(),
            provider,
            stream: Mutex::new(Some(stream)),
            stats: stats.clone(),
        });

        monitor.add_connection(id, ConnectionEntry::new(Arc::downgrade(&core), stats));
        Self { core }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.core.id
    }

    /// False once [`invalidate`](Self::invalidate) has run
    #[must_use]
    pub fn is_valid(&self) -> bool {
        lock(&self.core.stream).is_some()
    }

    /// Current counters of this connection
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        lock(&self.core.stats).snapshot()
    }

    /// Inspect the state a collector keeps for this connection
    ///
    /// Returns None if that collector has not observed this connection yet,
    /// or if its state is not a `T`.
    pub fn with_metric<T: Any, R>(&self, name: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let stats = lock(&self.core.stats);
        stats.metric_data(name).and_then(metric_as::<T>).map(f)
    }

    /// Stop using this connection for good
    ///
    /// Hands the stream back to its provider, removes the connection from the
    /// monitor and deletes its collector state. Later reads and writes fail
    /// with `NotConnected`. Returns false if already invalidated.
    pub fn invalidate(&self) -> bool {
        self.core.invalidate()
    }

    /// I/O mode of the underlying stream, or `NotConnected` once invalidated
    pub fn io_mode(&self, direction: Direction) -> io::Result<IoMode> {
        self.core.with_stream(|stream| stream.io_mode(direction))
    }

    pub fn set_io_mode(&self, direction: Direction, mode: IoMode) -> io::Result<()> {
        self.core
            .with_stream(|stream| stream.set_io_mode(direction, mode))
    }

    pub fn context(&self, direction: Direction) -> io::Result<StreamContext> {
        self.core
            .with_stream(|stream| stream.context(direction).clone())
    }

    /// Monitor this connection is registered with
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.core.monitor
    }
}

impl AsyncRead for InstrumentedConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let core = &self.core;
        let capacity = buf.remaining();
        let before = buf.filled().len();

        let result = {
            let mut stream = lock(&core.stream);
            let Some(stream) = stream.as_mut() else {
                return Poll::Ready(Err(core.not_connected()));
            };
            ready!(Pin::new(stream).poll_read(cx, buf))
        };

        let outcome = match &result {
            Ok(()) => match buf.filled().len() - before {
                0 if capacity > 0 => IoOutcome::EndOfStream,
                n => IoOutcome::Transferred(n),
            },
            Err(e) => IoOutcome::Failed(e.kind()),
        };
        core.monitor.on_connection_read(&core.stats, outcome);

        Poll::Ready(result)
    }
}

impl AsyncWrite for InstrumentedConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let core = &self.core;

        let result = {
            let mut stream = lock(&core.stream);
            let Some(stream) = stream.as_mut() else {
                return Poll::Ready(Err(core.not_connected()));
            };
            ready!(Pin::new(stream).poll_write(cx, buf))
        };

        let outcome = match &result {
            Ok(n) => IoOutcome::Transferred(*n),
            Err(e) => IoOutcome::Failed(e.kind()),
        };
        core.monitor.on_connection_write(&core.stats, outcome);

        Poll::Ready(result)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut stream = lock(&self.core.stream);
        match stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(self.core.not_connected())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut stream = lock(&self.core.stream);
        match stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Err(self.core.not_connected())),
        }
    }
}

impl std::fmt::Debug for InstrumentedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedConnection")
            .field("id", &self.core.id)
            .field("valid", &self.is_valid())
            .field("provider", &self.core.provider.properties().name)
            .finish()
    }
}
