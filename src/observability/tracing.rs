//! Connection spans.
//!
//! Every event emitted while a connection is served carries the connection
//! id and peer address through the span created here.

use tracing::Span;

use crate::net::ConnectionContext;

/// Span wrapping the whole lifetime of one accepted connection.
pub fn connection_span(transport: &'static str, ctx: &ConnectionContext) -> Span {
    tracing::debug_span!(
        "connection",
        transport,
        connection_id = %ctx.id,
        remote_addr = %ctx.remote_addr,
    )
}
