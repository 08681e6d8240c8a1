//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::transport::TransportError;

/// ALPN identifier for HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";
/// ALPN identifier for HTTP/1.1.
pub const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Build a TLS acceptor from PEM files, advertising `alpn` in preference order.
pub fn load_tls_acceptor(config: &TlsConfig, alpn: &[&[u8]]) -> Result<TlsAcceptor, TransportError> {
    let certs = load_certs(Path::new(&config.cert_path))?;
    let key = load_private_key(Path::new(&config.key_path))?;

    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    server_config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = open(path, "Certificate")?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Tls(format!("Invalid certificate {:?}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(TransportError::Tls(format!("No certificate found in {:?}", path)));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = open(path, "Private key")?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TransportError::Tls(format!("Invalid private key {:?}: {}", path, e)))?
        .ok_or_else(|| TransportError::Tls(format!("No private key found in {:?}", path)))
}

fn open(path: &Path, what: &str) -> Result<File, TransportError> {
    File::open(path).map_err(|e| TransportError::Tls(format!("{} file {:?}: {}", what, path, e)))
}
