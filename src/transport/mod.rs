//! Disguise transport subsystem.
//!
//! # Data Flow
//! ```text
//! Listener (net/listener.rs)
//!     → acceptor.rs (accept, TLS, spawn per connection)
//!     → http::HttpServer | http::WebSocketServer (parse handshake)
//!     → validator.rs (host / path / method)
//!         accept → ConnectionHandler::new_connection (duplex stream)
//!         reject → fallback.rs → ConnectionHandler::fallback_connection
//! ```
//!
//! # Design Decisions
//! - Both servers expose the same `ServerTransport` capability set and are
//!   selected by the configuration variant, never by type inspection
//! - Per-connection errors stay inside the connection task; only listener
//!   failures leave `serve`

pub mod acceptor;
pub mod config;
pub mod error;
pub mod fallback;
pub mod handler;
pub mod metadata;
pub mod validator;

pub use config::{HttpTransportConfig, WebSocketTransportConfig};
pub use error::{FallbackError, ProcessError, RejectCause, TransportError, UpgradeError};
pub use fallback::FallbackDispatcher;
pub use handler::{ConnectionHandler, FallbackOutcome};
pub use metadata::Metadata;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::net::UdpSocket;

use crate::config::{TlsConfig, TransportOptions};
use crate::http::{HttpServer, WebSocketServer};
use crate::net::listener::Listener;

/// Network a transport serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Tcp => f.write_str("tcp"),
        }
    }
}

/// Capability set shared by every disguise server.
#[async_trait]
pub trait ServerTransport: Send + Sync {
    /// Networks this transport serves.
    fn network(&self) -> &'static [Network];

    /// Accept and serve connections until `close` or a fatal listener error.
    async fn serve(&self, listener: Listener) -> Result<(), TransportError>;

    /// Datagram service. Disguise transports never offer it.
    async fn serve_packet(&self, socket: UdpSocket) -> Result<(), TransportError>;

    /// Stop accepting. Idempotent and safe before `serve`.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Build the server selected by `options`.
pub fn new_server(
    options: &TransportOptions,
    tls: Option<&TlsConfig>,
    handler: Arc<dyn ConnectionHandler>,
) -> Result<Box<dyn ServerTransport>, TransportError> {
    Ok(match options {
        TransportOptions::Http(http) => Box::new(HttpServer::new(http, tls, handler)?),
        TransportOptions::WebSocket(ws) => Box::new(WebSocketServer::new(ws, tls, handler)?),
    })
}
