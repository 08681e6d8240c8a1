//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration for the disguise server binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Which disguise transport to serve, and its options.
    pub transport: TransportOptions,

    /// Where promoted and fallback connections are sent.
    pub relay: RelayConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration. Absent means plaintext.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Disguise transport selection, tagged by `type`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportOptions {
    /// HTTP/1.1 and HTTP/2 streaming disguise.
    Http(HttpOptions),

    /// WebSocket disguise.
    #[serde(rename = "ws")]
    WebSocket(WebSocketOptions),
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions::Http(HttpOptions::default())
    }
}

/// Options for the HTTP disguise transport.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HttpOptions {
    /// Accepted `Host` values. Empty accepts any host.
    pub host: Vec<String>,

    /// Path prefix. A leading slash is added if missing.
    pub path: String,

    /// Required request method. Empty means `PUT`.
    pub method: String,

    /// Extra headers written on every successful response.
    pub headers: BTreeMap<String, String>,
}

/// Options for the WebSocket disguise transport.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WebSocketOptions {
    /// Upgrade path. A leading slash is added if missing.
    pub path: String,

    /// Extra headers written on the switching-protocols response.
    pub headers: BTreeMap<String, String>,

    /// Maximum early data the client may embed. Zero disables path suffixes.
    pub max_early_data: u32,

    /// Header carrying early data. Empty selects path-suffix mode.
    pub early_data_header_name: String,
}

/// Relay settings used by the bundled connection handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address promoted streams are piped to (e.g., "127.0.0.1:1080").
    pub upstream: String,

    /// Optional HTML page served to requests that fail the handshake.
    pub decoy_page: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream: "127.0.0.1:1080".to_string(),
            decoy_page: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "disguise_proxy=info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_transport_from_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [transport]
            type = "http"
            host = ["example.com"]
            path = "v2ray"

            [transport.headers]
            Server = "nginx"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.max_connections, 10_000);
        match config.transport {
            TransportOptions::Http(http) => {
                assert_eq!(http.host, vec!["example.com".to_string()]);
                assert_eq!(http.path, "v2ray");
                assert!(http.method.is_empty());
                assert_eq!(http.headers.get("Server").map(String::as_str), Some("nginx"));
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn websocket_transport_from_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [transport]
            type = "ws"
            path = "/ws"
            max_early_data = 2048
            early_data_header_name = "Sec-WebSocket-Protocol"
            "#,
        )
        .unwrap();

        match config.transport {
            TransportOptions::WebSocket(ws) => {
                assert_eq!(ws.path, "/ws");
                assert_eq!(ws.max_early_data, 2048);
                assert_eq!(ws.early_data_header_name, "Sec-WebSocket-Protocol");
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert!(matches!(config.transport, TransportOptions::Http(_)));
        assert!(config.listener.tls.is_none());
        assert_eq!(config.relay.upstream, "127.0.0.1:1080");
    }
}
