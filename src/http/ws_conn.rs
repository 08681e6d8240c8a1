//! Byte stream over a WebSocket connection.
//!
//! Binary and text messages carry stream bytes; a close frame (or the end of
//! the message stream) ends the read half. Writes go out as binary messages.

use bytes::{Buf, Bytes};
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// `AsyncRead + AsyncWrite` adapter for a server-side WebSocket.
pub struct WebSocketConn<S> {
    inner: WebSocketStream<S>,
    read_buf: Bytes,
    read_closed: bool,
}

impl<S> WebSocketConn<S> {
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            read_buf: Bytes::new(),
            read_closed: false,
        }
    }
}

fn into_io_error(error: WsError) -> io::Error {
    match error {
        WsError::Io(e) => e,
        WsError::ConnectionClosed | WsError::AlreadyClosed => io::ErrorKind::BrokenPipe.into(),
        other => io::Error::other(other),
    }
}

impl<S> AsyncRead for WebSocketConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
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
            if self.read_closed {
                return Poll::Ready(Ok(()));
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(Message::Binary(data))) => self.read_buf = data,
                Some(Ok(Message::Text(text))) => {
                    self.read_buf = Bytes::copy_from_slice(text.as_bytes());
                }
                Some(Ok(Message::Close(_))) | None => self.read_closed = true,
                // Control frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    self.read_closed = true;
                }
                Some(Err(e)) => return Poll::Ready(Err(into_io_error(e))),
            }
        }
    }
}

impl<S> AsyncWrite for WebSocketConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        ready!(self.inner.poll_ready_unpin(cx)).map_err(into_io_error)?;
        self.inner
            .start_send_unpin(Message::binary(Bytes::copy_from_slice(data)))
            .map_err(into_io_error)?;
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.poll_flush_unpin(cx).map_err(into_io_error)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(self.inner.poll_close_unpin(cx)) {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(into_io_error(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (WebSocketStream<DuplexStream>, WebSocketConn<DuplexStream>) {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (client, WebSocketConn::new(server))
    }

    #[tokio::test]
    async fn binary_and_text_frames_are_stream_bytes() {
        let (mut client, mut conn) = pair().await;
        client.send(Message::binary(&b"abc"[..])).await.unwrap();
        client.send(Message::text("def")).await.unwrap();
        client.send(Message::Close(None)).await.unwrap();

        let mut out = Vec::new();
        conn.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn writes_become_binary_frames() {
        let (mut client, mut conn) = pair().await;
        conn.write_all(b"pong").await.unwrap();
        conn.flush().await.unwrap();

        match client.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(&data[..], b"pong"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn small_reads_drain_a_large_frame() {
        let (mut client, mut conn) = pair().await;
        client.send(Message::binary(vec![7u8; 100])).await.unwrap();

        let mut chunk = [0u8; 30];
        let mut total = 0;
        while total < 100 {
            let n = conn.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            assert!(chunk[..n].iter().all(|&b| b == 7));
            total += n;
        }
        assert_eq!(total, 100);
    }
}
