//! WebSocket disguise server.
//!
//! # Responsibilities
//! - Check the upgrade path and extract early data
//! - Complete the WebSocket handshake with a bounded timeout
//! - Hand the upgraded connection to the handler as a duplex stream
//!
//! # Data Flow
//! ```text
//! HTTP/1.1 request
//!     → path check (exact unless suffix early data is enabled)
//!     → early data: path suffix | configured header (URL-safe base64)
//!     → Upgrader::handshake → 101 → hyper upgrade
//!     → WebSocketConn (+ CachedStream for early data) → new_connection
//! ```
//!
//! # Design Decisions
//! - Early data length is bounded by the header size limit, not checked
//!   against `max_early_data`
//! - Failures after the 101 head cannot reach the fallback and go straight
//!   to the handler's error sink

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

use crate::config::{TlsConfig, WebSocketOptions};
use crate::http::response::ResponseWriter;
use crate::http::upgrader::Upgrader;
use crate::http::ws_conn::WebSocketConn;
use crate::http::http1_builder;
use crate::lifecycle::Shutdown;
use crate::net::listener::Listener;
use crate::net::tls::{load_tls_acceptor, ALPN_HTTP11};
use crate::net::{BoxedStream, CachedStream, ConnectionContext, ConnectionTracker};
use crate::transport::acceptor::{AcceptLoop, Accepted, ConnectionService};
use crate::transport::metadata::{source_address, Metadata};
use crate::transport::{
    ConnectionHandler, FallbackDispatcher, Network, ProcessError, RejectCause, ServerTransport,
    TransportError, UpgradeError, WebSocketTransportConfig,
};

/// URL-safe alphabet, no padding, lenient about trailing bits.
const EARLY_DATA_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Disguise server speaking WebSocket.
pub struct WebSocketServer {
    service: Arc<WebSocketService>,
    tls: Option<TlsAcceptor>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
}

struct WebSocketService {
    config: WebSocketTransportConfig,
    upgrader: Upgrader,
    handler: Arc<dyn ConnectionHandler>,
    fallback: FallbackDispatcher,
}

impl WebSocketServer {
    pub fn new(
        options: &WebSocketOptions,
        tls: Option<&TlsConfig>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Self, TransportError> {
        Self::with_upgrader(options, tls, handler, Upgrader::default())
    }

    /// Build the server with a custom handshake policy.
    pub fn with_upgrader(
        options: &WebSocketOptions,
        tls: Option<&TlsConfig>,
        handler: Arc<dyn ConnectionHandler>,
        upgrader: Upgrader,
    ) -> Result<Self, TransportError> {
        let config = WebSocketTransportConfig::new(options)?;
        let tls = tls
            .map(|tls| load_tls_acceptor(tls, &[ALPN_HTTP11]))
            .transpose()?;

        Ok(Self {
            service: Arc::new(WebSocketService {
                config,
                upgrader,
                fallback: FallbackDispatcher::new(Arc::clone(&handler)),
                handler,
            }),
            tls,
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn config(&self) -> &WebSocketTransportConfig {
        &self.service.config
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

#[async_trait]
impl ServerTransport for WebSocketServer {
    fn network(&self) -> &'static [Network] {
        &[Network::Tcp]
    }

    async fn serve(&self, listener: Listener) -> Result<(), TransportError> {
        AcceptLoop {
            name: "ws",
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
            tracing::info!(transport = "ws", "Transport closed");
        }
        Ok(())
    }
}

impl ConnectionService for WebSocketService {
    async fn serve_connection(self: Arc<Self>, ctx: ConnectionContext, conn: Accepted) {
        let service = service_fn(move |request: Request<Incoming>| {
            let (writer, pending) = ResponseWriter::new();
            tokio::spawn(Arc::clone(&self).handle_request(ctx, request, writer));
            async move { Ok::<_, Infallible>(pending.wait().await) }
        });

        if let Err(e) = http1_builder()
            .serve_connection(TokioIo::new(conn.stream), service)
            .with_upgrades()
            .await
        {
            tracing::debug!(connection_id = %ctx.id, error = %e, "WebSocket connection error");
        }
    }
}

impl WebSocketService {
    /// Early data carried by the request, validating the path on the way.
    fn early_data<B>(&self, request: &Request<B>) -> Result<Bytes, RejectCause> {
        let path = request.uri().path();
        if self.config.requires_exact_path() && path != self.config.path {
            return Err(RejectCause::BadPath(path.to_string()));
        }

        let encoded: &[u8] = match &self.config.early_data_header {
            None => {
                let target = request
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or(path);
                match target.strip_prefix(self.config.path.as_str()) {
                    Some(suffix) => suffix.as_bytes(),
                    None => return Err(RejectCause::BadPath(path.to_string())),
                }
            }
            Some(name) => request
                .headers()
                .get(name)
                .map(|value| value.as_bytes())
                .unwrap_or_default(),
        };

        if encoded.is_empty() {
            return Ok(Bytes::new());
        }
        EARLY_DATA_ENGINE
            .decode(encoded)
            .map(Bytes::from)
            .map_err(RejectCause::DecodeEarlyData)
    }

    async fn handle_request(
        self: Arc<Self>,
        ctx: ConnectionContext,
        mut request: Request<Incoming>,
        writer: ResponseWriter,
    ) {
        let early_data = match self.early_data(&request) {
            Ok(early_data) => early_data,
            Err(cause) => {
                self.fallback
                    .dispatch(ctx, request.into_body(), &writer, cause)
                    .await;
                return;
            }
        };

        let accept_headers = match self.upgrader.handshake(&request) {
            Ok(headers) => headers,
            Err(e) => {
                self.fallback
                    .dispatch(ctx, request.into_body(), &writer, RejectCause::Upgrade(e))
                    .await;
                return;
            }
        };

        let metadata = Metadata::from_source(source_address(request.headers(), ctx.remote_addr));
        let on_upgrade = hyper::upgrade::on(&mut request);
        drop(request);

        writer.extend_headers(&self.config.headers);
        writer.extend_headers(&accept_headers);
        writer.write_header(StatusCode::SWITCHING_PROTOCOLS);

        let upgraded = match tokio::time::timeout(self.upgrader.handshake_timeout(), on_upgrade).await
        {
            Ok(Ok(upgraded)) => upgraded,
            Ok(Err(e)) => {
                return self.upgrade_failed(ctx, UpgradeError::Failed(e.to_string()));
            }
            Err(_) => return self.upgrade_failed(ctx, UpgradeError::Timeout),
        };

        let socket =
            WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        let conn = WebSocketConn::new(socket);
        let stream: BoxedStream = if early_data.is_empty() {
            Box::new(conn)
        } else {
            Box::new(CachedStream::new(conn, early_data))
        };

        tracing::debug!(
            connection_id = %ctx.id,
            source = ?metadata.source,
            "Promoted WebSocket connection"
        );
        self.handler.new_connection(ctx, stream, metadata).await;
    }

    fn upgrade_failed(&self, ctx: ConnectionContext, error: UpgradeError) {
        self.handler.new_error(
            ctx,
            ProcessError {
                remote: ctx.remote_addr,
                cause: RejectCause::Upgrade(error),
                fallback: None,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    struct Noop;

    #[async_trait]
    impl ConnectionHandler for Noop {
        async fn new_connection(&self, _: ConnectionContext, _: BoxedStream, _: Metadata) {}
        fn new_error(&self, _: ConnectionContext, _: ProcessError) {}
    }

    fn service(options: WebSocketOptions) -> Arc<WebSocketService> {
        let server = WebSocketServer::new(&options, None, Arc::new(Noop)).unwrap();
        Arc::clone(&server.service)
    }

    fn get(uri: &str) -> Request<()> {
        Request::builder().uri(uri).body(()).unwrap()
    }

    #[test]
    fn exact_path_without_early_data() {
        let svc = service(WebSocketOptions {
            path: "/ws".into(),
            ..Default::default()
        });
        assert_eq!(svc.early_data(&get("/ws")).unwrap(), Bytes::new());
        assert!(matches!(
            svc.early_data(&get("/ws-extra")),
            Err(RejectCause::BadPath(ref p)) if p == "/ws-extra"
        ));
    }

    #[test]
    fn suffix_early_data() {
        let svc = service(WebSocketOptions {
            path: "/ws".into(),
            max_early_data: 2048,
            ..Default::default()
        });
        let encoded = EARLY_DATA_ENGINE.encode(b"hello");
        let data = svc.early_data(&get(&format!("/ws{}", encoded))).unwrap();
        assert_eq!(data, Bytes::from_static(b"hello"));

        assert_eq!(svc.early_data(&get("/ws")).unwrap(), Bytes::new());
        assert!(matches!(svc.early_data(&get("/other")), Err(RejectCause::BadPath(_))));

        let err = svc.early_data(&get("/ws!!!")).unwrap_err();
        assert!(matches!(err, RejectCause::DecodeEarlyData(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn header_early_data() {
        let svc = service(WebSocketOptions {
            path: "/ws".into(),
            max_early_data: 2048,
            early_data_header_name: "Sec-WebSocket-Protocol".into(),
            ..Default::default()
        });

        assert_eq!(svc.early_data(&get("/ws")).unwrap(), Bytes::new());

        let mut request = get("/ws");
        request.headers_mut().insert(
            "sec-websocket-protocol",
            HeaderValue::from_str(&EARLY_DATA_ENGINE.encode([0u8, 1, 2, 250])).unwrap(),
        );
        assert_eq!(svc.early_data(&request).unwrap(), Bytes::from_static(&[0, 1, 2, 250]));

        let mut request = get("/ws");
        request
            .headers_mut()
            .insert("sec-websocket-protocol", HeaderValue::from_static("***"));
        assert!(matches!(
            svc.early_data(&request),
            Err(RejectCause::DecodeEarlyData(_))
        ));

        // Header mode keeps the path exact.
        assert!(matches!(svc.early_data(&get("/wsAAAA")), Err(RejectCause::BadPath(_))));
    }

    #[test]
    fn engine_accepts_unpadded_url_safe_input() {
        assert_eq!(EARLY_DATA_ENGINE.decode("-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(EARLY_DATA_ENGINE.decode("-_8=").is_err());
    }
}
