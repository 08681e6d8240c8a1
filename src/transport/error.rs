//! Error types for the disguise transports.

use hyper::StatusCode;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Server-level failures. Construction errors and listener failures surface
/// here; per-connection problems never do.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport options could not be turned into a usable configuration.
    #[error("Invalid transport configuration: {0}")]
    Config(String),

    /// TLS material could not be loaded.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Failed to bind the listener.
    #[error("Failed to bind: {0}")]
    Bind(io::Error),

    /// The listener failed while accepting.
    #[error("Failed to accept: {0}")]
    Accept(io::Error),

    /// The operation is not offered by this transport.
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
}

/// Why a request was not promoted to a tunnel connection.
#[derive(Debug, Error)]
pub enum RejectCause {
    #[error("bad host: {0}")]
    BadHost(String),

    #[error("bad path: {0}")]
    BadPath(String),

    #[error("bad method: {0}")]
    BadMethod(String),

    #[error("decode early data: {0}")]
    DecodeEarlyData(base64::DecodeError),

    #[error("upgrade websocket connection: {0}")]
    Upgrade(#[from] UpgradeError),

    #[error("hijack conn: {0}")]
    Hijack(io::Error),
}

impl RejectCause {
    /// Status code written when the fallback does not answer the request itself.
    pub fn status(&self) -> StatusCode {
        match self {
            RejectCause::BadHost(_) => StatusCode::BAD_REQUEST,
            RejectCause::BadPath(_) | RejectCause::BadMethod(_) => StatusCode::NOT_FOUND,
            RejectCause::DecodeEarlyData(_) | RejectCause::Upgrade(_) => StatusCode::BAD_REQUEST,
            RejectCause::Hijack(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// WebSocket handshake failures.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("request method is not GET")]
    MethodNotGet,

    #[error("'upgrade' token not found in 'Connection' header")]
    MissingConnectionUpgrade,

    #[error("'websocket' token not found in 'Upgrade' header")]
    MissingUpgradeWebsocket,

    #[error("unsupported websocket version")]
    UnsupportedVersion,

    #[error("'Sec-WebSocket-Key' header is missing or invalid")]
    InvalidKey,

    #[error("request origin not allowed")]
    OriginRejected,

    #[error("handshake timed out")]
    Timeout,

    #[error("{0}")]
    Failed(String),
}

/// Failure reported by a fallback handler.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("fallback connection: {0}")]
    Io(#[from] io::Error),

    #[error("fallback connection: {0}")]
    Other(String),
}

/// Combined error delivered to `ConnectionHandler::new_error`.
#[derive(Debug, Error)]
#[error("process connection from {remote}: {cause}{}", fallback_suffix(.fallback))]
pub struct ProcessError {
    /// Peer the failing request came from.
    pub remote: SocketAddr,
    /// Original reason the request was rejected.
    pub cause: RejectCause,
    /// Error from the fallback handler, if it failed too.
    pub fallback: Option<FallbackError>,
}

fn fallback_suffix(fallback: &Option<FallbackError>) -> String {
    match fallback {
        Some(err) => format!(" | {}", err),
        None => String::new(),
    }
}
