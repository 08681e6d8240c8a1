//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the relay handler and the configured transport
//! - Bind the listener and serve until a stop signal
//! - Close the transport and report how serving ended
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, after TLS material and the decoy are loaded

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::lifecycle::signals::shutdown_signal;
use crate::net::listener::Listener;
use crate::relay::{RelayError, RelayHandler};
use crate::transport::{new_server, TransportError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Run the server until SIGINT or SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    run_until(config, shutdown_signal()).await
}

/// Run the server until `stop` resolves or the listener fails.
pub async fn run_until<F>(config: ServerConfig, stop: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    let handler = Arc::new(RelayHandler::from_config(&config.relay).await?);
    tracing::info!(
        upstream = handler.upstream(),
        decoy = config.relay.decoy_page.is_some(),
        "Relay handler ready"
    );

    let transport = new_server(&config.transport, config.listener.tls.as_ref(), handler)?;
    let listener = Listener::bind(&config.listener).await?;

    let serve = transport.serve(listener);
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => return result.map_err(StartupError::from),
        _ = stop => {}
    }

    transport.close().await?;
    serve.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
