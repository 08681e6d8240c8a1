//! Downstream connection handler contract.

use async_trait::async_trait;

use crate::net::{BoxedStream, ConnectionContext};
use crate::transport::error::{FallbackError, ProcessError};
use crate::transport::metadata::Metadata;

/// Result of offering a rejected request to the fallback handler.
#[derive(Debug)]
pub enum FallbackOutcome {
    /// The handler answered the request itself.
    Handled,
    /// The handler does not serve fallback traffic.
    Declined,
    /// The handler tried and failed.
    Failed(FallbackError),
}

/// Consumer of streams produced by a disguise transport.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called exactly once per promoted connection. The handler owns the
    /// stream from here on.
    async fn new_connection(&self, ctx: ConnectionContext, stream: BoxedStream, metadata: Metadata);

    /// Offered every request that failed validation, decoding or upgrade.
    ///
    /// Writes to `stream` become the HTTP response body.
    async fn fallback_connection(
        &self,
        _ctx: ConnectionContext,
        _stream: BoxedStream,
        _metadata: Metadata,
    ) -> FallbackOutcome {
        FallbackOutcome::Declined
    }

    /// Fire-and-forget error sink.
    fn new_error(&self, ctx: ConnectionContext, error: ProcessError);
}
