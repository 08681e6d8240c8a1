//! HTTP/2 cleartext preface detection.
//!
//! # Responsibilities
//! - Peek at the first request line of a plaintext connection
//! - Route `PRI * HTTP/2.0` with an empty header block to HTTP/2
//! - Hand every other connection to HTTP/1.1 with the peeked bytes replayed
//!
//! # Design Decisions
//! - Detection happens before any configuration check, so the preface is
//!   served whatever host, path or method the transport expects
//! - At most the length of the preface head is awaited; a diverging byte
//!   ends sniffing early

use bytes::BytesMut;
use std::io;
use tokio::io::AsyncReadExt;

use crate::net::{BoxedStream, CachedStream};

/// Request line and empty header block that open the HTTP/2 preface.
const PREFACE_HEAD: &[u8] = b"PRI * HTTP/2.0\r\n\r\n";

/// Protocol a plaintext connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    H2c,
}

/// Outcome of inspecting the bytes read so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sniff {
    NeedMore,
    Done(Protocol),
}

/// The pseudo-request carried by the HTTP/2 connection preface.
pub fn is_h2c_preface(method: &str, target: &str, version: &str, header_count: usize) -> bool {
    method == "PRI" && header_count == 0 && target == "*" && version == "HTTP/2.0"
}

fn classify(buf: &[u8]) -> Sniff {
    let Some(line_end) = buf.windows(2).position(|w| w == b"\r\n") else {
        return if PREFACE_HEAD.starts_with(buf) {
            Sniff::NeedMore
        } else {
            Sniff::Done(Protocol::Http1)
        };
    };

    let line = String::from_utf8_lossy(&buf[..line_end]);
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Sniff::Done(Protocol::Http1);
    };

    let headers = &buf[line_end + 2..];
    if headers.len() < 2 {
        return Sniff::NeedMore;
    }
    let header_count = usize::from(!headers.starts_with(b"\r\n"));

    if is_h2c_preface(method, target, version, header_count) {
        Sniff::Done(Protocol::H2c)
    } else {
        Sniff::Done(Protocol::Http1)
    }
}

/// Read enough of `stream` to tell HTTP/1.1 from an HTTP/2 preface.
///
/// The returned stream replays every byte consumed while sniffing.
pub async fn sniff(mut stream: BoxedStream) -> io::Result<(BoxedStream, Protocol)> {
    let mut buf = BytesMut::with_capacity(PREFACE_HEAD.len());
    let protocol = loop {
        match classify(&buf) {
            Sniff::Done(protocol) => break protocol,
            Sniff::NeedMore => {
                if stream.read_buf(&mut buf).await? == 0 {
                    break Protocol::Http1;
                }
            }
        }
    };

    Ok((Box::new(CachedStream::new(stream, buf.freeze())), protocol))
}
