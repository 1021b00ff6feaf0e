//! Raw byte transport underneath the handshake and the encrypted codec.
//!
//! Wraps any async byte stream (TCP in production, in-memory pipes in tests)
//! and adds the read-timeout handling the handshake needs.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{CadenceStreamError, Result};

/// Byte stream a transport can run over.
///
/// `Sync` keeps the encrypted halves shareable across await points in
/// spawned tasks.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Byte-exact transport with a swappable read timeout.
pub struct Transport {
    stream: BoxedStream,
    /// Timeout restored by [`Transport::restore_timeout`]. `None` waits forever.
    default_timeout: Option<Duration>,
    timeout: Option<Duration>,
}

impl Transport {
    pub fn new(stream: impl AsyncStream) -> Self {
        Self {
            stream: Box::new(stream),
            default_timeout: None,
            timeout: None,
        }
    }

    /// Open a TCP connection to `addr` (`host:port`).
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| CadenceStreamError::Timeout)??;
        stream.set_nodelay(true)?;
        tracing::debug!(addr, "connected to access point");
        Ok(Self::new(stream))
    }

    /// Set the timeout used by default for reads.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self.timeout = timeout;
        self
    }

    /// Override the read timeout until [`Transport::restore_timeout`].
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn restore_timeout(&mut self) {
        self.timeout = self.default_timeout;
    }

    /// Read up to `n` bytes.
    ///
    /// Stops early when the current timeout elapses or the peer closes the
    /// stream, returning whatever arrived. End-of-stream before any byte is
    /// `ConnectionClosed`.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(n);
        let fill = fill_up_to(&mut self.stream, &mut buf, n);
        let result = match self.timeout {
            Some(t) => match tokio::time::timeout(t, fill).await {
                Ok(res) => res,
                Err(_) => {
                    tracing::trace!(wanted = n, "read timed out");
                    Ok(())
                }
            },
            None => fill.await,
        };
        result?;
        Ok(buf.freeze())
    }

    /// Read exactly `n` bytes.
    pub async fn read_fully(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        let read = self.stream.read_exact(&mut buf);
        let res = match self.timeout {
            Some(t) => tokio::time::timeout(t, read)
                .await
                .map_err(|_| CadenceStreamError::Timeout)?,
            None => read.await,
        };
        res.map_err(map_read_error)?;
        Ok(Bytes::from(buf))
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> BoxedStream {
        self.stream
    }
}

async fn fill_up_to(stream: &mut BoxedStream, buf: &mut BytesMut, n: usize) -> Result<()> {
    while buf.len() < n {
        let mut limited = (&mut *stream).take((n - buf.len()) as u64);
        if limited.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Err(CadenceStreamError::ConnectionClosed);
            }
            break;
        }
    }
    Ok(())
}

/// End-of-stream mid-message means the peer went away.
pub(crate) fn map_read_error(err: std::io::Error) -> CadenceStreamError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        CadenceStreamError::ConnectionClosed
    } else {
        CadenceStreamError::Io(err)
    }
}
