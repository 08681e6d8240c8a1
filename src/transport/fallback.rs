//! Fallback routing for rejected requests.
//!
//! # Responsibilities
//! - Offer every rejected request to the handler's fallback
//! - Write the rejection status when the fallback does not answer
//! - Surface the combined error chain to the handler's error sink
//!
//! # Data Flow
//! ```text
//! rejected request
//!     → HttpConn (request body + response writer)
//!     → ConnectionHandler::fallback_connection
//!         Handled  → done
//!         Declined → write status, report cause
//!         Failed   → write status, report cause + fallback error
//! ```

use bytes::Bytes;
use hyper::body::Body;
use std::sync::Arc;

use crate::http::conn::HttpConn;
use crate::http::response::ResponseWriter;
use crate::net::ConnectionContext;
use crate::transport::error::{ProcessError, RejectCause};
use crate::transport::handler::{ConnectionHandler, FallbackOutcome};
use crate::transport::metadata::Metadata;

/// Routes rejected requests to the downstream fallback.
#[derive(Clone)]
pub struct FallbackDispatcher {
    handler: Arc<dyn ConnectionHandler>,
}

impl FallbackDispatcher {
    pub fn new(handler: Arc<dyn ConnectionHandler>) -> Self {
        Self { handler }
    }

    /// Offer a rejected request to the fallback handler.
    ///
    /// The response body is closed on return, whatever the outcome.
    pub async fn dispatch<B>(
        &self,
        ctx: ConnectionContext,
        body: B,
        writer: &ResponseWriter,
        cause: RejectCause,
    ) where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        tracing::debug!(
            connection_id = %ctx.id,
            remote_addr = %ctx.remote_addr,
            cause = %cause,
            "Request rejected, offering to fallback"
        );

        let conn = HttpConn::new(body, writer.clone());
        let outcome = self
            .handler
            .fallback_connection(ctx, Box::new(conn), Metadata::default())
            .await;

        let fallback = match outcome {
            FallbackOutcome::Handled => {
                writer.close_body();
                return;
            }
            FallbackOutcome::Declined => None,
            FallbackOutcome::Failed(err) => Some(err),
        };

        writer.write_header(cause.status());
        writer.close_body();

        self.handler.new_error(
            ctx,
            ProcessError {
                remote: ctx.remote_addr,
                cause,
                fallback,
            },
        );
    }
}
