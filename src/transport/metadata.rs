//! Connection metadata attached to promoted and fallback streams.

use hyper::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Header consulted for the original client address behind a reverse proxy.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Source/destination pair describing a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    pub source: Option<SocketAddr>,
    pub destination: Option<SocketAddr>,
}

impl Metadata {
    /// Metadata with only a source address.
    pub fn from_source(source: SocketAddr) -> Self {
        Self {
            source: Some(source),
            destination: None,
        }
    }
}

/// Derive the client address for a request.
///
/// The first parseable IP in `X-Forwarded-For` replaces the peer IP; the
/// peer port is kept.
pub fn source_address(headers: &HeaderMap, remote_addr: SocketAddr) -> SocketAddr {
    headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|candidate| candidate.trim().parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, remote_addr.port()))
        .unwrap_or(remote_addr)
}
