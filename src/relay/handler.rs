//! Relay connection handler.
//!
//! # Responsibilities
//! - Pipe promoted streams to the configured upstream
//! - Answer rejected requests with a static decoy page
//! - Log every error the transport reports
//!
//! # Design Decisions
//! - The decoy is read once at startup and shared as `Bytes`
//! - Without a decoy the handler declines, so probes see a bare status code

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::RelayConfig;
use crate::net::{BoxedStream, ConnectionContext};
use crate::transport::{ConnectionHandler, FallbackOutcome, Metadata, ProcessError};

/// Upper bound on connecting to the upstream.
pub const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to read decoy page {path:?}: {source}")]
    Decoy { path: PathBuf, source: io::Error },
}

/// Connection handler relaying tunnel streams to a fixed upstream.
#[derive(Debug, Clone)]
pub struct RelayHandler {
    upstream: String,
    decoy: Option<Bytes>,
}

impl RelayHandler {
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            decoy: None,
        }
    }

    /// Serve `page` to every rejected request.
    pub fn with_decoy(mut self, page: impl Into<Bytes>) -> Self {
        self.decoy = Some(page.into());
        self
    }

    /// Build from configuration, reading the decoy page if one is set.
    pub async fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let handler = Self::new(config.upstream.clone());
        match &config.decoy_page {
            Some(path) => {
                let page = tokio::fs::read(path).await.map_err(|source| RelayError::Decoy {
                    path: path.clone(),
                    source,
                })?;
                Ok(handler.with_decoy(page))
            }
            None => Ok(handler),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }
}

#[async_trait]
impl ConnectionHandler for RelayHandler {
    async fn new_connection(&self, ctx: ConnectionContext, mut stream: BoxedStream, metadata: Metadata) {
        let connect = TcpStream::connect(self.upstream.as_str());
        let mut upstream = match tokio::time::timeout(UPSTREAM_CONNECT_TIMEOUT, connect).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => {
                tracing::warn!(
                    connection_id = %ctx.id,
                    upstream = %self.upstream,
                    error = %e,
                    "Failed to connect upstream"
                );
                return;
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %ctx.id,
                    upstream = %self.upstream,
                    "Upstream connect timed out"
                );
                return;
            }
        };

        match tokio::io::copy_bidirectional(&mut stream, &mut upstream).await {
            Ok((to_upstream, to_client)) => {
                tracing::debug!(
                    connection_id = %ctx.id,
                    source = ?metadata.source,
                    to_upstream,
                    to_client,
                    "Relay finished"
                );
            }
            Err(e) => {
                tracing::debug!(connection_id = %ctx.id, error = %e, "Relay interrupted");
            }
        }
    }

    async fn fallback_connection(
        &self,
        ctx: ConnectionContext,
        mut stream: BoxedStream,
        _metadata: Metadata,
    ) -> FallbackOutcome {
        let Some(page) = &self.decoy else {
            return FallbackOutcome::Declined;
        };

        if let Err(e) = stream.write_all(page).await {
            return FallbackOutcome::Failed(e.into());
        }
        if let Err(e) = stream.shutdown().await {
            return FallbackOutcome::Failed(e.into());
        }
        tracing::debug!(connection_id = %ctx.id, bytes = page.len(), "Served decoy page");
        FallbackOutcome::Handled
    }

    fn new_error(&self, ctx: ConnectionContext, error: ProcessError) {
        tracing::warn!(connection_id = %ctx.id, error = %error, "Connection failed");
    }
}
