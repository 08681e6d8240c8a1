//! WebSocket handshake policy.
//!
//! # Responsibilities
//! - Validate the client's upgrade request (RFC 6455 section 4.2.1)
//! - Compute the switching-protocols response headers
//! - Own the handshake timeout and origin policy of one server
//!
//! # Design Decisions
//! - One `Upgrader` per server instance, no process-wide state
//! - Origins are accepted by default: disguise clients send whatever origin
//!   their browser-like stack produces

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::{Method, Request};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::transport::UpgradeError;

/// Default bound on the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Decides whether a request's origin may open a WebSocket.
pub type OriginPolicy = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

/// Server-side WebSocket handshake configuration.
#[derive(Clone)]
pub struct Upgrader {
    handshake_timeout: Duration,
    check_origin: OriginPolicy,
}

impl Upgrader {
    /// Upgrader accepting any origin.
    pub fn new(handshake_timeout: Duration) -> Self {
        Self {
            handshake_timeout,
            check_origin: Arc::new(|_| true),
        }
    }

    /// Replace the origin policy.
    pub fn with_origin_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&HeaderMap) -> bool + Send + Sync + 'static,
    {
        self.check_origin = Arc::new(check);
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Validate an upgrade request, returning the headers of the `101` answer.
    pub fn handshake<B>(&self, request: &Request<B>) -> Result<HeaderMap, UpgradeError> {
        if request.method() != Method::GET {
            return Err(UpgradeError::MethodNotGet);
        }

        let headers = request.headers();
        if !header_contains_token(headers, &CONNECTION, "upgrade") {
            return Err(UpgradeError::MissingConnectionUpgrade);
        }
        if !header_contains_token(headers, &UPGRADE, "websocket") {
            return Err(UpgradeError::MissingUpgradeWebsocket);
        }
        if headers.get(SEC_WEBSOCKET_VERSION).map(HeaderValue::as_bytes) != Some(b"13") {
            return Err(UpgradeError::UnsupportedVersion);
        }
        if !(self.check_origin)(headers) {
            return Err(UpgradeError::OriginRejected);
        }

        let key = headers
            .get(SEC_WEBSOCKET_KEY)
            .filter(|key| is_valid_challenge_key(key.as_bytes()))
            .ok_or(UpgradeError::InvalidKey)?;

        let mut response = HeaderMap::new();
        response.insert(UPGRADE, HeaderValue::from_static("websocket"));
        response.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes()))
            .map_err(|e| UpgradeError::Failed(e.to_string()))?;
        response.insert(SEC_WEBSOCKET_ACCEPT, accept);

        if let Some(protocol) = first_token(headers, &SEC_WEBSOCKET_PROTOCOL) {
            if let Ok(value) = HeaderValue::from_str(protocol) {
                response.insert(SEC_WEBSOCKET_PROTOCOL, value);
            }
        }

        Ok(response)
    }
}

impl Default for Upgrader {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

impl std::fmt::Debug for Upgrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgrader")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

fn header_tokens<'a>(headers: &'a HeaderMap, name: &HeaderName) -> impl Iterator<Item = &'a str> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn header_contains_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    header_tokens(headers, name).any(|t| t.eq_ignore_ascii_case(token))
}

fn first_token<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    header_tokens(headers, name).next()
}

/// A challenge key is 16 random bytes, base64 encoded.
fn is_valid_challenge_key(key: &[u8]) -> bool {
    STANDARD
        .decode(key)
        .map(|decoded| decoded.len() == 16)
        .unwrap_or(false)
}
