use std::io;

use tokio::net::TcpStream;

use crate::proto::error::{Error, Result};

/// Byte-stream transport the engine drives through readiness events.
///
/// Implementations are non-blocking: `try_read`/`try_write` return
/// [`io::ErrorKind::WouldBlock`] when the transport is not ready right now,
/// and `try_read` returns `Ok(0)` when the peer has ended the stream. The
/// event loop owning the transport delivers [`TransportEvent`]s to the
/// engine whenever readiness changes.
pub trait Transport {
    /// Reads available bytes into `buf` without blocking.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes as much of `data` as the transport accepts without blocking,
    /// returning how many bytes it took.
    fn try_write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Closes the transport immediately.
    fn close(&mut self);
}

/// Readiness notification delivered to the engine by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport finished opening and is usable.
    Opened,
    /// Bytes are available to read.
    Readable,
    /// The transport can accept writes again.
    Writable,
    /// The peer ended the stream.
    Eof,
    /// The transport failed.
    Failed,
}

/// TCP transport over a tokio stream.
///
/// Uses the readiness try-APIs so the engine itself never blocks; the
/// [`drive`](crate::core::Client::drive) loop waits for readiness and turns
/// it into events.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Wraps an already-connected stream.
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub(crate) fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }
}

impl Transport for TcpTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.stream {
            Some(stream) => stream.try_read(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed")),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match &self.stream {
            Some(stream) => stream.try_write(data),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed")),
        }
    }

    fn close(&mut self) {
        // dropping the stream closes the socket
        self.stream = None;
    }
}

/// Resolves a `redis://host:port` address and opens the TCP stream.
pub(crate) async fn open_tcp(addr: &str) -> Result<TcpStream> {
    let parsed = url::Url::parse(addr).map_err(|_| Error::InvalidArgument {
        message: "invalid address format".to_string(),
    })?;

    if parsed.scheme() != "redis" {
        return Err(Error::InvalidArgument {
            message: "invalid scheme, expected redis://".to_string(),
        });
    }

    let host = parsed.host_str().ok_or_else(|| Error::InvalidArgument {
        message: "missing host in address".to_string(),
    })?;
    let port = parsed.port().unwrap_or(6379);

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::Io { source: e })?;
    Ok(stream)
}
