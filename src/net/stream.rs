//! Duplex stream abstractions.
//!
//! # Responsibilities
//! - Name the byte-stream capability handed to connection handlers
//! - Replay buffered bytes ahead of live socket reads (`CachedStream`)
//!
//! # Design Decisions
//! - Any `AsyncRead + AsyncWrite` type qualifies, so hijacked sockets,
//!   request/response adapters and WebSocket adapters share one type
//! - The prefix is consumed exactly once and never re-read

use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A bidirectional byte stream with an independently closable write half.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Owned, type-erased duplex stream.
pub type BoxedStream = Box<dyn DuplexStream>;

/// Stream decorator that yields `prefix` before reading from `inner`.
///
/// Used for early data decoded from a WebSocket handshake and for bytes the
/// HTTP layer buffered before a connection was hijacked.
pub struct CachedStream<S> {
    inner: S,
    prefix: Bytes,
}

impl<S> CachedStream<S> {
    /// Wrap `inner`, replaying `prefix` first.
    pub fn new(inner: S, prefix: impl Into<Bytes>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    /// Bytes not yet handed to a reader.
    pub fn remaining_prefix(&self) -> &[u8] {
        &self.prefix
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CachedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.prefix.has_remaining() {
            let n = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..n]);
            self.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CachedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
