//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bounded accept)
//!     → tls.rs (optional TLS handshake, ALPN)
//!     → connection.rs (connection id, in-flight tracking)
//!     → Hand off to a disguise server (http layer)
//!     → stream.rs (duplex stream given to the connection handler)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - TLS is optional and handled transparently
//! - Handlers only ever see `BoxedStream`, whatever produced it

pub mod connection;
pub mod listener;
pub mod stream;
pub mod tls;

pub use connection::{ConnectionContext, ConnectionId, ConnectionTracker};
pub use listener::Listener;
pub use stream::{BoxedStream, CachedStream, DuplexStream};
