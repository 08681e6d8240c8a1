//! Shared utilities for transport integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use disguise_proxy::net::listener::Listener;
use disguise_proxy::net::{BoxedStream, ConnectionContext};
use disguise_proxy::transport::{
    ConnectionHandler, FallbackOutcome, Metadata, ProcessError, ServerTransport, TransportError,
};

/// Handler that echoes promoted streams and records everything it sees.
#[derive(Default)]
pub struct RecordingHandler {
    decoy: Option<&'static [u8]>,
    promoted: Mutex<Vec<Metadata>>,
    fallbacks: Mutex<usize>,
    errors: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_decoy(page: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            decoy: Some(page),
            ..Default::default()
        })
    }

    pub fn promoted(&self) -> Vec<Metadata> {
        self.promoted.lock().unwrap().clone()
    }

    pub fn fallbacks(&self) -> usize {
        *self.fallbacks.lock().unwrap()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionHandler for RecordingHandler {
    async fn new_connection(&self, _ctx: ConnectionContext, stream: BoxedStream, metadata: Metadata) {
        self.promoted.lock().unwrap().push(metadata);
        let (mut reader, mut writer) = tokio::io::split(stream);
        let _ = tokio::io::copy(&mut reader, &mut writer).await;
        let _ = writer.shutdown().await;
    }

    async fn fallback_connection(
        &self,
        _ctx: ConnectionContext,
        mut stream: BoxedStream,
        _metadata: Metadata,
    ) -> FallbackOutcome {
        *self.fallbacks.lock().unwrap() += 1;
        match self.decoy {
            Some(page) => {
                stream.write_all(page).await.unwrap();
                FallbackOutcome::Handled
            }
            None => FallbackOutcome::Declined,
        }
    }

    fn new_error(&self, _ctx: ConnectionContext, error: ProcessError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

pub struct RunningServer {
    pub server: Arc<dyn ServerTransport>,
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<(), TransportError>>,
}

impl RunningServer {
    /// Close the server and wait for `serve` to return.
    pub async fn shutdown(self) {
        self.server.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("serve did not return after close")
            .unwrap()
            .unwrap();
    }
}

/// Serve `server` on an ephemeral loopback port.
pub async fn start(server: Box<dyn ServerTransport>) -> RunningServer {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let server: Arc<dyn ServerTransport> = Arc::from(server);

    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(Listener::from(tcp)).await })
    };

    RunningServer { server, addr, task }
}

/// Open a connection and send `bytes` verbatim.
pub async fn send_raw(addr: SocketAddr, bytes: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream
}

/// Read a response head, up to and including the blank line.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut byte))
            .await
            .expect("timed out reading response head")
            .unwrap();
        assert!(n > 0, "connection closed mid-head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Status code of a raw response head.
pub fn status_of(head: &str) -> u16 {
    head.split(' ').nth(1).unwrap().parse().unwrap()
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
