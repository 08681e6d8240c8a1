//! HTTP and WebSocket disguise transports for a proxy inbound.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod transport;

pub use config::schema::ServerConfig;
pub use http::{HttpServer, WebSocketServer};
pub use lifecycle::Shutdown;
pub use transport::{new_server, ConnectionHandler, FallbackOutcome, ServerTransport};
