//! Immutable transport configurations built from deserialized options.
//!
//! # Design Decisions
//! - Built once at server construction and shared read-only via `Arc`
//! - Header names and methods are parsed up front so request handling
//!   never re-validates them

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Method;
use std::collections::BTreeMap;

use crate::config::{HttpOptions, WebSocketOptions};
use crate::transport::error::TransportError;

/// Configuration of the HTTP disguise transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Accepted hosts. Empty accepts any host.
    pub hosts: Vec<String>,
    /// Path prefix, always starting with `/`.
    pub path: String,
    /// Required request method.
    pub method: Method,
    /// Headers injected into successful responses.
    pub headers: HeaderMap,
}

impl HttpTransportConfig {
    pub fn new(options: &HttpOptions) -> Result<Self, TransportError> {
        let method = if options.method.is_empty() {
            Method::PUT
        } else {
            Method::from_bytes(options.method.as_bytes()).map_err(|_| {
                TransportError::Config(format!("invalid method '{}'", options.method))
            })?
        };

        Ok(Self {
            hosts: options.host.clone(),
            path: normalize_path(&options.path),
            method,
            headers: header_map(&options.headers)?,
        })
    }
}

/// Configuration of the WebSocket disguise transport.
#[derive(Debug, Clone)]
pub struct WebSocketTransportConfig {
    /// Upgrade path, always starting with `/`.
    pub path: String,
    /// Headers injected into the switching-protocols response.
    pub headers: HeaderMap,
    /// Maximum early data a client may embed.
    pub max_early_data: u32,
    /// Header carrying early data. `None` selects path-suffix mode.
    pub early_data_header: Option<HeaderName>,
}

impl WebSocketTransportConfig {
    pub fn new(options: &WebSocketOptions) -> Result<Self, TransportError> {
        let early_data_header = if options.early_data_header_name.is_empty() {
            None
        } else {
            Some(
                HeaderName::from_bytes(options.early_data_header_name.as_bytes()).map_err(|_| {
                    TransportError::Config(format!(
                        "invalid early data header '{}'",
                        options.early_data_header_name
                    ))
                })?,
            )
        };

        Ok(Self {
            path: normalize_path(&options.path),
            headers: header_map(&options.headers)?,
            max_early_data: options.max_early_data,
            early_data_header,
        })
    }

    /// Whether the request path must equal the configured path exactly.
    pub fn requires_exact_path(&self) -> bool {
        self.max_early_data == 0 || self.early_data_header.is_some()
    }
}

/// Ensure a path starts with `/`.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::Config(format!("invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::Config(format!("invalid value for header '{}'", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}
