//! Handshake acceptance checks for the HTTP transport.
//!
//! # Responsibilities
//! - Match the request host against the allowed set
//! - Match the path prefix (case-sensitive)
//! - Match the request method
//!
//! # Design Decisions
//! - Checks run in a fixed order; the first failure decides the status code
//! - Empty host set = any host (wildcard)
//! - Host comparison is exact, including any port the client sent

use hyper::header::HOST;
use hyper::Request;

use crate::transport::config::HttpTransportConfig;
use crate::transport::error::RejectCause;

/// Host the client addressed: the URI authority (HTTP/2 `:authority`,
/// absolute-form targets) or else the `Host` header.
pub fn request_host<B>(request: &Request<B>) -> &str {
    request
        .uri()
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| request.headers().get(HOST).and_then(|h| h.to_str().ok()))
        .unwrap_or("")
}

/// Accept or reject a request against the HTTP transport configuration.
pub fn validate<B>(request: &Request<B>, config: &HttpTransportConfig) -> Result<(), RejectCause> {
    let host = request_host(request);
    if !config.hosts.is_empty() && !config.hosts.iter().any(|allowed| allowed == host) {
        return Err(RejectCause::BadHost(host.to_string()));
    }

    let path = request.uri().path();
    if !path.starts_with(&config.path) {
        return Err(RejectCause::BadPath(path.to_string()));
    }

    if *request.method() != config.method {
        return Err(RejectCause::BadMethod(request.method().to_string()));
    }

    Ok(())
}
