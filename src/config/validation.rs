//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, header tokens and methods before the server starts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ServerConfig → Result<(), Vec<ValidationError>>

use hyper::header::{HeaderName, HeaderValue};
use hyper::Method;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{ServerConfig, TransportOptions};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("invalid socket address '{}'", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than zero",
        ));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }

    match &config.transport {
        TransportOptions::Http(http) => {
            if !http.method.is_empty() && Method::from_bytes(http.method.as_bytes()).is_err() {
                errors.push(ValidationError::new(
                    "transport.method",
                    format!("invalid HTTP method '{}'", http.method),
                ));
            }
            validate_headers(&http.headers, &mut errors);
        }
        TransportOptions::WebSocket(ws) => {
            if !ws.early_data_header_name.is_empty()
                && HeaderName::from_bytes(ws.early_data_header_name.as_bytes()).is_err()
            {
                errors.push(ValidationError::new(
                    "transport.early_data_header_name",
                    format!("invalid header name '{}'", ws.early_data_header_name),
                ));
            }
            validate_headers(&ws.headers, &mut errors);
        }
    }

    if !is_host_port(&config.relay.upstream) {
        errors.push(ValidationError::new(
            "relay.upstream",
            format!("expected host:port, got '{}'", config.relay.upstream),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_headers(headers: &BTreeMap<String, String>, errors: &mut Vec<ValidationError>) {
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "transport.headers",
                format!("invalid header name '{}'", name),
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("transport.headers.{}", name),
                "invalid header value",
            ));
        }
    }
}

fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
