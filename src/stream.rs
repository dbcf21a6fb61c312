//! Duplex stream abstraction for monitored connections
//!
//! A [`Connection`] is whatever a [`ConnectionProvider`](crate::provider::ConnectionProvider)
//! hands out: an async byte stream plus a per-direction I/O mode and context.
//! The monitor only intercepts reads and writes; everything else passes through.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Trait for async streams that can back a monitored connection
///
/// Automatically implemented for any type that implements
/// AsyncRead + AsyncWrite + Unpin + Send + Sync.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

/// Direction of a stream half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// How the owner of a stream intends to drive it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IoMode {
    /// Callers await readiness and expect an outcome every time
    Blocking,
    /// Callers are prepared for `Poll::Pending` and will be woken
    #[default]
    Asynchronous,
}

/// Opaque per-direction properties attached to a stream by its provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamContext {
    properties: BTreeMap<String, String>,
}

impl StreamContext {
    /// Property key for the remote address of socket-backed streams
    pub const PEER_ADDR: &'static str = "peer_address";
    /// Property key for the local address of socket-backed streams
    pub const LOCAL_ADDR: &'static str = "local_address";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, returning the updated context
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a property
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// A live duplex connection produced by a provider
pub trait Connection: AsyncStream {
    /// Current I/O mode of one direction
    fn io_mode(&self, direction: Direction) -> IoMode;

    /// Change the I/O mode of one direction
    fn set_io_mode(&mut self, direction: Direction, mode: IoMode);

    /// Context of one direction
    fn context(&self, direction: Direction) -> &StreamContext;
}

/// Adapter that turns any [`AsyncStream`] into a [`Connection`]
///
/// The I/O mode is bookkeeping only; the wrapped stream is always driven
/// through its async interface.
#[derive(Debug)]
pub struct ConnectionStream<S = TcpStream> {
    inner: S,
    input_mode: IoMode,
    output_mode: IoMode,
    input_context: StreamContext,
    output_context: StreamContext,
}

impl<S: AsyncStream> ConnectionStream<S> {
    /// Wrap a stream with empty contexts and asynchronous I/O mode
    pub fn new(inner: S) -> Self {
        Self::with_context(inner, StreamContext::default())
    }

    /// Wrap a stream, sharing one context between both directions
    pub fn with_context(inner: S, context: StreamContext) -> Self {
        Self {
            inner,
            input_mode: IoMode::default(),
            output_mode: IoMode::default(),
            input_context: context.clone(),
            output_context: context,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl ConnectionStream<TcpStream> {
    /// Wrap a TCP stream, recording its socket addresses in the context
    pub fn tcp(stream: TcpStream) -> Self {
        let mut context = StreamContext::new();
        if let Ok(peer) = stream.peer_addr() {
            context.set_property(StreamContext::PEER_ADDR, peer.to_string());
        }
        if let Ok(local) = stream.local_addr() {
            context.set_property(StreamContext::LOCAL_ADDR, local.to_string());
        }
        Self::with_context(stream, context)
    }

    /// Remote address of the underlying socket
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}

impl<S: AsyncStream> Connection for ConnectionStream<S> {
    fn io_mode(&self, direction: Direction) -> IoMode {
        match direction {
            Direction::Input => self.input_mode,
            Direction::Output => self.output_mode,
        }
    }

    fn set_io_mode(&mut self, direction: Direction, mode: IoMode) {
        match direction {
            Direction::Input => self.input_mode = mode,
            Direction::Output => self.output_mode = mode,
        }
    }

    fn context(&self, direction: Direction) -> &StreamContext {
        match direction {
            Direction::Input => &self.input_context,
            Direction::Output => &self.output_context,
        }
    }
}

impl<S: AsyncStream> AsyncRead for ConnectionStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncStream> AsyncWrite for ConnectionStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
