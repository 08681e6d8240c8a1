//! Accept loop shared by the disguise servers.
//!
//! # Responsibilities
//! - Accept connections until shutdown or a fatal listener error
//! - Run the TLS handshake (bounded) in the per-connection task
//! - Hand each connection to the server's connection service
//!
//! # Design Decisions
//! - One spawned task per connection; nothing is awaited inline except accept
//! - Aborted or reset peers during accept are logged and skipped
//! - Shutdown only stops accepting; spawned tasks run to completion

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::lifecycle::Shutdown;
use crate::net::listener::Listener;
use crate::net::tls::ALPN_H2;
use crate::net::{BoxedStream, ConnectionContext, ConnectionTracker};
use crate::observability::connection_span;
use crate::transport::error::TransportError;

/// Upper bound on a TLS handshake.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// A connection ready for HTTP processing.
pub struct Accepted {
    pub stream: BoxedStream,
    /// TLS negotiated `h2` through ALPN.
    pub alpn_h2: bool,
}

/// Per-connection entry point of a server.
pub trait ConnectionService: Send + Sync + 'static {
    fn serve_connection(
        self: Arc<Self>,
        ctx: ConnectionContext,
        conn: Accepted,
    ) -> impl Future<Output = ()> + Send;
}

/// Shared state of a running accept loop.
pub struct AcceptLoop<'a> {
    pub name: &'static str,
    pub tls: Option<&'a TlsAcceptor>,
    pub shutdown: &'a Shutdown,
    pub tracker: &'a ConnectionTracker,
}

impl AcceptLoop<'_> {
    /// Serve `listener` until shutdown (`Ok`) or a fatal accept error.
    pub async fn run<S: ConnectionService>(
        self,
        listener: Listener,
        service: Arc<S>,
    ) -> Result<(), TransportError> {
        let mut signal = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            return Ok(());
        }

        tracing::info!(
            transport = self.name,
            address = ?listener.local_addr().ok(),
            tls = self.tls.is_some(),
            "Transport serving"
        );

        loop {
            let accepted = tokio::select! {
                _ = signal.recv() => break,
                accepted = listener.accept() => accepted,
            };

            let (tcp, remote_addr, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(TransportError::Accept(e)) if is_transient(&e) => {
                    tracing::warn!(transport = self.name, error = %e, "Transient accept error");
                    continue;
                }
                Err(e) => {
                    tracing::error!(transport = self.name, error = %e, "Listener failed");
                    return Err(e);
                }
            };

            if let Err(e) = tcp.set_nodelay(true) {
                tracing::trace!(error = %e, "Failed to set TCP_NODELAY");
            }

            let ctx = ConnectionContext::new(remote_addr);
            let guard = self.tracker.track(ctx);
            let tls = self.tls.cloned();
            let service = Arc::clone(&service);
            let span = connection_span(self.name, &ctx);

            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;

                let conn = match tls {
                    None => Accepted {
                        stream: Box::new(tcp),
                        alpn_h2: false,
                    },
                    Some(acceptor) => {
                        match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(tcp)).await
                        {
                            Ok(Ok(stream)) => {
                                let alpn_h2 = stream.get_ref().1.alpn_protocol() == Some(ALPN_H2);
                                Accepted {
                                    stream: Box::new(stream),
                                    alpn_h2,
                                }
                            }
                            Ok(Err(e)) => {
                                tracing::debug!(connection_id = %ctx.id, error = %e, "TLS handshake failed");
                                return;
                            }
                            Err(_) => {
                                tracing::debug!(connection_id = %ctx.id, "TLS handshake timed out");
                                return;
                            }
                        }
                    }
                };

                service.serve_connection(ctx, conn).await;
            }
            .instrument(span));
        }

        tracing::info!(
            transport = self.name,
            active_connections = self.tracker.active_count(),
            "Transport stopped accepting"
        );
        Ok(())
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}
