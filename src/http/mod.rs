//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! accepted connection (plain or TLS)
//!     → server.rs     ALPN h2 / h2c preface sniff (h2c.rs) / HTTP/1.1
//!     → websocket.rs  HTTP/1.1 with upgrades, handshake via upgrader.rs
//!     → response.rs   one-shot head, streamed body, hijack capability
//!     → conn.rs       request body + response writer as a duplex stream
//!     → ws_conn.rs    WebSocket messages as a duplex stream
//! ```
//!
//! # Design Decisions
//! - Requests are served by hyper directly; every request runs in its own
//!   task and talks to hyper only through a `ResponseWriter`
//! - Header read timeout and header size limit are shared by both servers

pub mod conn;
pub mod h2c;
pub mod response;
pub mod server;
pub mod upgrader;
pub mod websocket;
pub mod ws_conn;

pub use conn::HttpConn;
pub use response::{Hijack, HijackSlot, Hijacked, PendingResponse, ResponseBody, ResponseWriter};
pub use server::HttpServer;
pub use upgrader::Upgrader;
pub use websocket::WebSocketServer;
pub use ws_conn::WebSocketConn;

use hyper::server::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;

/// Time allowed for a client to send a complete request head.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Largest accepted request head.
pub const MAX_HEADER_BYTES: usize = 1 << 20;

pub(crate) fn http1_builder() -> http1::Builder {
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .max_buf_size(MAX_HEADER_BYTES);
    builder
}

pub(crate) fn http2_builder() -> http2::Builder<TokioExecutor> {
    let mut builder = http2::Builder::new(TokioExecutor::new());
    builder
        .timer(TokioTimer::new())
        .max_header_list_size(MAX_HEADER_BYTES as u32);
    builder
}
