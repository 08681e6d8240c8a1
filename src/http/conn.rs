//! Duplex stream over a request body and a response writer.
//!
//! Reads yield the request body, writes become the response body. Used where
//! the transport cannot hand out a raw socket (HTTP/2 streams) and for every
//! fallback offer.

use bytes::{Buf, Bytes};
use hyper::body::Body;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{error::SendError, OwnedPermit};

use crate::http::response::ResponseWriter;

type ReserveFuture =
    Pin<Box<dyn Future<Output = Result<OwnedPermit<Bytes>, SendError<()>>> + Send>>;

/// Request/response pair exposed as `AsyncRead + AsyncWrite`.
pub struct HttpConn<B> {
    body: B,
    read_buf: Bytes,
    read_done: bool,
    writer: ResponseWriter,
    reserve: Option<ReserveFuture>,
}

impl<B> HttpConn<B> {
    pub fn new(body: B, writer: ResponseWriter) -> Self {
        Self {
            body,
            read_buf: Bytes::new(),
            read_done: false,
            writer,
            reserve: None,
        }
    }
}

impl<B> AsyncRead for HttpConn<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.read_buf.has_remaining() {
                let n = self.read_buf.len().min(buf.remaining());
                buf.put_slice(&self.read_buf[..n]);
                self.read_buf.advance(n);
                return Poll::Ready(Ok(()));
            }
            if self.read_done {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut self.body).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // Trailers carry no stream bytes.
                    if let Ok(data) = frame.into_data() {
                        self.read_buf = data;
                    }
                }
                Some(Err(e)) => return Poll::Ready(Err(io::Error::other(e))),
                None => self.read_done = true,
            }
        }
    }
}

impl<B: Unpin> AsyncWrite for HttpConn<B> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let reserve = match this.reserve.as_mut() {
            Some(reserve) => reserve,
            None => {
                let Some(tx) = this.writer.body_sender() else {
                    return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
                };
                this.reserve.insert(Box::pin(tx.reserve_owned()))
            }
        };

        let reserved = ready!(reserve.as_mut().poll(cx));
        this.reserve = None;

        match reserved {
            Ok(permit) => {
                permit.send(Bytes::copy_from_slice(data));
                Poll::Ready(Ok(data.len()))
            }
            Err(_) => Poll::Ready(Err(io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Chunks reach hyper as soon as they are sent.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.reserve = None;
        self.writer.close_body();
        Poll::Ready(Ok(()))
    }
}
