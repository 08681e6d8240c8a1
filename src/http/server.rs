//! HTTP disguise server.
//!
//! # Responsibilities
//! - Serve HTTP/1.1, h2 (TLS ALPN) and h2c (cleartext preface) connections
//! - Validate each request against the transport configuration
//! - Promote accepted requests into duplex streams for the handler
//! - Send everything else through the fallback dispatcher
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     ├─ ALPN h2       → serve_h2
//!     ├─ PRI preface   → serve_h2
//!     └─ otherwise     → serve_h1 (keep-alive until a request is promoted)
//!
//! handle_request:
//!     validate → 200 head → hijack?
//!         Supported   → raw socket (+ buffered bytes) → new_connection
//!         Unsupported → HttpConn(body, writer)        → new_connection → close
//! ```
//!
//! # Design Decisions
//! - HTTP/1.1 connections stay alive across rejected requests; a promoted
//!   response carries `Connection: close`, which ends hyper's keep-alive so
//!   the socket is released once the head is flushed
//! - A promoted HTTP/1.1 request's declared body belongs to HTTP framing and
//!   is consumed by hyper; only bytes past it reach the stream
//! - The request task never blocks the connection task; hyper keeps driving
//!   the socket while the handler runs

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONNECTION};
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_rustls::TlsAcceptor;

use crate::config::{HttpOptions, TlsConfig};
use crate::http::conn::HttpConn;
use crate::http::h2c::{self, Protocol};
use crate::http::response::{Hijack, HijackSlot, ResponseWriter};
use crate::http::{http1_builder, http2_builder, HEADER_READ_TIMEOUT};
use crate::lifecycle::Shutdown;
use crate::net::listener::Listener;
use crate::net::tls::{load_tls_acceptor, ALPN_H2, ALPN_HTTP11};
use crate::net::{BoxedStream, ConnectionContext, ConnectionTracker};
use crate::transport::acceptor::{AcceptLoop, Accepted, ConnectionService};
use crate::transport::metadata::{source_address, Metadata};
use crate::transport::validator::validate;
use crate::transport::{
    ConnectionHandler, FallbackDispatcher, HttpTransportConfig, Network, RejectCause,
    ServerTransport, TransportError,
};

/// Disguise server speaking plain HTTP.
pub struct HttpServer {
    service: Arc<HttpService>,
    tls: Option<TlsAcceptor>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
}

struct HttpService {
    config: HttpTransportConfig,
    handler: Arc<dyn ConnectionHandler>,
    fallback: FallbackDispatcher,
}

impl HttpServer {
    /// Build the server. TLS material is loaded here, so bad certificates
    /// fail construction.
    pub fn new(
        options: &HttpOptions,
        tls: Option<&TlsConfig>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Self, TransportError> {
        let config = HttpTransportConfig::new(options)?;
        let tls = tls
            .map(|tls| load_tls_acceptor(tls, &[ALPN_H2, ALPN_HTTP11]))
            .transpose()?;

        Ok(Self {
            service: Arc::new(HttpService {
                config,
                fallback: FallbackDispatcher::new(Arc::clone(&handler)),
                handler,
            }),
            tls,
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.service.config
    }

    /// Connections accepted and not yet finished.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

#[async_trait]
impl ServerTransport for HttpServer {
    fn network(&self) -> &'static [Network] {
        &[Network::Tcp]
    }

    async fn serve(&self, listener: Listener) -> Result<(), TransportError> {
        AcceptLoop {
            name: "http",
            tls: self.tls.as_ref(),
            shutdown: &self.shutdown,
            tracker: &self.tracker,
        }
        .run(listener, Arc::clone(&self.service))
        .await
    }

    async fn serve_packet(&self, _socket: UdpSocket) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("serve_packet"))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.shutdown.trigger() {
            tracing::info!(transport = "http", "Transport closed");
        }
        Ok(())
    }
}

impl ConnectionService for HttpService {
    async fn serve_connection(self: Arc<Self>, ctx: ConnectionContext, conn: Accepted) {
        if conn.alpn_h2 {
            return self.serve_h2(ctx, conn.stream).await;
        }

        match tokio::time::timeout(HEADER_READ_TIMEOUT, h2c::sniff(conn.stream)).await {
            Ok(Ok((stream, Protocol::H2c))) => self.serve_h2(ctx, stream).await,
            Ok(Ok((stream, Protocol::Http1))) => self.serve_h1(ctx, stream).await,
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %ctx.id, error = %e, "Failed to read request line");
            }
            Err(_) => {
                tracing::debug!(connection_id = %ctx.id, "Timed out waiting for request line");
            }
        }
    }
}

impl HttpService {
    async fn serve_h1(self: Arc<Self>, ctx: ConnectionContext, stream: BoxedStream) {
        let slot = HijackSlot::new();
        let service = {
            let slot = slot.clone();
            service_fn(move |request: Request<Incoming>| {
                let (writer, pending) = ResponseWriter::with_hijack(&slot);
                tokio::spawn(Arc::clone(&self).handle_request(ctx, request, writer));
                async move { Ok::<_, Infallible>(pending.wait().await) }
            })
        };

        match http1_builder()
            .serve_connection(TokioIo::new(stream), service)
            .without_shutdown()
            .await
        {
            Ok(parts) => {
                if slot.complete(parts.io.into_inner(), parts.read_buf) {
                    tracing::trace!(connection_id = %ctx.id, "Connection released to request task");
                }
            }
            Err(e) => {
                tracing::debug!(connection_id = %ctx.id, error = %e, "HTTP/1.1 connection error");
            }
        }
    }

    async fn serve_h2(self: Arc<Self>, ctx: ConnectionContext, stream: BoxedStream) {
        let service = service_fn(move |request: Request<Incoming>| {
            let (writer, pending) = ResponseWriter::new();
            tokio::spawn(Arc::clone(&self).handle_request(ctx, request, writer));
            async move { Ok::<_, Infallible>(pending.wait().await) }
        });

        if let Err(e) = http2_builder()
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            tracing::debug!(connection_id = %ctx.id, error = %e, "HTTP/2 connection error");
        }
    }

    async fn handle_request(
        self: Arc<Self>,
        ctx: ConnectionContext,
        request: Request<Incoming>,
        writer: ResponseWriter,
    ) {
        if let Err(cause) = validate(&request, &self.config) {
            self.fallback
                .dispatch(ctx, request.into_body(), &writer, cause)
                .await;
            return;
        }

        let metadata = Metadata::from_source(source_address(request.headers(), ctx.remote_addr));

        writer.insert_header(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        writer.extend_headers(&self.config.headers);
        if writer.can_hijack() {
            writer.insert_header(CONNECTION, HeaderValue::from_static("close"));
        }
        writer.write_header(StatusCode::OK);

        match writer.hijack() {
            Hijack::Supported(hijacked) => {
                // Releasing the body lets hyper finish the exchange and hand
                // back the socket.
                drop(request);
                match hijacked.into_stream().await {
                    Ok(stream) => {
                        tracing::debug!(
                            connection_id = %ctx.id,
                            source = ?metadata.source,
                            "Promoted HTTP/1.1 connection"
                        );
                        self.handler.new_connection(ctx, stream, metadata).await;
                    }
                    Err(e) => {
                        self.fallback
                            .dispatch(ctx, Empty::<Bytes>::new(), &writer, RejectCause::Hijack(e))
                            .await;
                    }
                }
            }
            Hijack::Unsupported => {
                tracing::debug!(
                    connection_id = %ctx.id,
                    source = ?metadata.source,
                    "Promoted HTTP/2 stream"
                );
                let conn = HttpConn::new(request.into_body(), writer.clone());
                self.handler
                    .new_connection(ctx, Box::new(conn), metadata)
                    .await;
                writer.close_body();
            }
        }
    }
}
