//! One-shot response sink for a single request.
//!
//! # Responsibilities
//! - Collect response headers and commit the head exactly once
//! - Stream body bytes to hyper through a bounded channel
//! - Expose the hijack capability of HTTP/1.1 connections
//!
//! # Data Flow
//! ```text
//! request task                          connection task (hyper)
//!     ResponseWriter::write_header ──head──▶ PendingResponse::wait
//!     HttpConn::poll_write ──────────bytes──▶ ResponseBody::poll_frame
//!     ResponseWriter::hijack ◀──raw socket── HijackSlot::complete
//! ```
//!
//! # Design Decisions
//! - Writer handles are cheap clones over shared state, so the request task,
//!   the stream adapter and the fallback path can all reach the same sink
//! - A second `write_header` is ignored, like a superfluous header write
//! - On hijack-capable connections an explicitly written head carries no body;
//!   the socket itself becomes the body once hyper releases it

use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

use crate::net::{BoxedStream, CachedStream};

/// Number of body chunks buffered between the writer and hyper.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Response body fed by a `ResponseWriter`.
#[derive(Debug)]
pub struct ResponseBody {
    rx: Option<mpsc::Receiver<Bytes>>,
}

impl ResponseBody {
    /// A body with no content.
    pub fn empty() -> Self {
        Self { rx: None }
    }

    fn channel(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx: Some(rx) }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        match self.get_mut().rx.as_mut() {
            Some(rx) => rx.poll_recv(cx).map(|chunk| chunk.map(|data| Ok(Frame::data(data)))),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.rx.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match self.rx {
            Some(_) => SizeHint::default(),
            None => SizeHint::with_exact(0),
        }
    }
}

/// Future side of a `ResponseWriter`: resolves once the head is committed.
pub struct PendingResponse {
    rx: oneshot::Receiver<Response<ResponseBody>>,
}

impl PendingResponse {
    /// Wait for the response head. A writer dropped without writing one
    /// produces an empty `200 OK`.
    pub async fn wait(self) -> Response<ResponseBody> {
        self.rx
            .await
            .unwrap_or_else(|_| Response::new(ResponseBody::empty()))
    }
}

/// Connection-side half of the hijack capability.
///
/// Holds the sender for the raw socket of an HTTP/1.1 connection until hyper
/// has finished writing the response and released the IO.
#[derive(Clone, Default)]
pub struct HijackSlot {
    tx: Arc<Mutex<Option<oneshot::Sender<BoxedStream>>>>,
}

impl HijackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn arm(&self) -> oneshot::Receiver<BoxedStream> {
        let (tx, rx) = oneshot::channel();
        *self.tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    /// Deliver the released connection. Bytes hyper had already buffered are
    /// replayed ahead of the socket.
    ///
    /// Returns `false` when the request gave up on the socket or never asked
    /// for it, in which case the connection is dropped.
    pub fn complete(&self, io: BoxedStream, read_buf: Bytes) -> bool {
        let Some(tx) = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return false;
        };
        let stream: BoxedStream = if read_buf.is_empty() {
            io
        } else {
            Box::new(CachedStream::new(io, read_buf))
        };
        tx.send(stream).is_ok()
    }
}

/// Answer to a hijack capability query.
pub enum Hijack {
    /// The raw connection will be handed over once the head is on the wire.
    Supported(Hijacked),
    /// The transport cannot release a raw socket (e.g. an HTTP/2 stream).
    Unsupported,
}

/// Pending raw connection from a successful hijack request.
pub struct Hijacked {
    rx: oneshot::Receiver<BoxedStream>,
}

impl Hijacked {
    pub async fn into_stream(self) -> io::Result<BoxedStream> {
        self.rx.await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection closed before it could be hijacked",
            )
        })
    }
}

struct WriterState {
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Response<ResponseBody>>>,
    body_tx: Option<mpsc::Sender<Bytes>>,
    hijack_rx: Option<oneshot::Receiver<BoxedStream>>,
    hijackable: bool,
    body_closed: bool,
}

/// Shared handle to the response of one request.
#[derive(Clone)]
pub struct ResponseWriter {
    state: Arc<Mutex<WriterState>>,
}

impl ResponseWriter {
    /// Writer for a transport that cannot release its socket.
    pub fn new() -> (Self, PendingResponse) {
        Self::build(None)
    }

    /// Writer for an HTTP/1.1 connection whose socket can be hijacked.
    pub fn with_hijack(slot: &HijackSlot) -> (Self, PendingResponse) {
        Self::build(Some(slot.arm()))
    }

    fn build(hijack_rx: Option<oneshot::Receiver<BoxedStream>>) -> (Self, PendingResponse) {
        let (head_tx, rx) = oneshot::channel();
        let writer = Self {
            state: Arc::new(Mutex::new(WriterState {
                headers: HeaderMap::new(),
                head_tx: Some(head_tx),
                body_tx: None,
                hijackable: hijack_rx.is_some(),
                hijack_rx,
                body_closed: false,
            })),
        };
        (writer, PendingResponse { rx })
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set a response header, replacing any previous value.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    /// Set every header in `headers`, replacing previous values.
    pub fn extend_headers(&self, headers: &HeaderMap) {
        let mut state = self.lock();
        for (name, value) in headers {
            state.headers.insert(name.clone(), value.clone());
        }
    }

    /// Whether the head has already been committed.
    pub fn head_written(&self) -> bool {
        self.lock().head_tx.is_none()
    }

    /// Commit the response head. Returns `false` if it was already written.
    pub fn write_header(&self, status: StatusCode) -> bool {
        let mut state = self.lock();
        let streaming = !state.hijackable && status_has_body(status);
        commit(&mut state, status, streaming)
    }

    /// Sender for body bytes, committing a `200 OK` head first if needed.
    ///
    /// `None` once the body is closed or the head was written without one.
    pub(crate) fn body_sender(&self) -> Option<mpsc::Sender<Bytes>> {
        let mut state = self.lock();
        if state.body_closed {
            return None;
        }
        if state.head_tx.is_some() {
            commit(&mut state, StatusCode::OK, true);
        }
        state.body_tx.clone()
    }

    /// End the response body. Idempotent.
    ///
    /// An unclaimed hijack is given up too, so the connection closes once the
    /// response is flushed.
    pub fn close_body(&self) {
        let mut state = self.lock();
        state.body_closed = true;
        state.body_tx = None;
        state.hijack_rx = None;
    }

    /// Whether `hijack` would hand over the raw connection.
    pub fn can_hijack(&self) -> bool {
        self.lock().hijack_rx.is_some()
    }

    /// Query the hijack capability.
    ///
    /// When supported, the head is committed (as `200 OK` if nothing was
    /// written yet) and the raw connection is delivered after hyper flushes it.
    pub fn hijack(&self) -> Hijack {
        let mut state = self.lock();
        let Some(rx) = state.hijack_rx.take() else {
            return Hijack::Unsupported;
        };
        if state.head_tx.is_some() {
            commit(&mut state, StatusCode::OK, false);
        }
        state.body_closed = true;
        state.body_tx = None;
        Hijack::Supported(Hijacked { rx })
    }
}

fn status_has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn commit(state: &mut WriterState, status: StatusCode, streaming: bool) -> bool {
    let Some(head_tx) = state.head_tx.take() else {
        tracing::trace!(%status, "Superfluous response head ignored");
        return false;
    };

    let body = if streaming && !state.body_closed {
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        state.body_tx = Some(tx);
        ResponseBody::channel(rx)
    } else {
        ResponseBody::empty()
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = std::mem::take(&mut state.headers);

    // The connection may already be gone; nothing is waiting for the head then.
    let _ = head_tx.send(response);
    true
}
