//! Puts sniffed bytes back in front of a stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;

/// A byte stream the listener can sniff and hand on.
pub trait Transport: AsyncRead + AsyncWrite + Unpin {
    /// Whether `poll_shutdown` closes only the write half and leaves reads open.
    fn supports_half_close(&self) -> bool;

    /// Whether the peer opens with a TLS record-layer ClientHello that can be
    /// sniffed. Datagram-based handshakes (QUIC) cannot.
    fn carries_tls_records(&self) -> bool {
        true
    }
}

impl Transport for TcpStream {
    fn supports_half_close(&self) -> bool {
        true
    }
}

#[cfg(unix)]
impl Transport for tokio::net::UnixStream {
    fn supports_half_close(&self) -> bool {
        true
    }
}

impl Transport for DuplexStream {
    fn supports_half_close(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("cannot replay bytes onto an absent connection")]
    InvalidConnection,
}

/// Serves `replay` to readers first, then reads from `inner`.
///
/// Once the replay bytes are drained they are dropped and the wrapper is a
/// plain pass-through for good. Writes always go straight to `inner`.
#[derive(Debug)]
pub struct ReplayConn<S> {
    inner: S,
    replay: Option<Bytes>,
}

impl<S> ReplayConn<S> {
    /// Wrap `inner`. An empty `replay` leaves nothing buffered and every read
    /// goes straight through.
    pub fn new(inner: S, replay: impl Into<Bytes>) -> Self {
        let replay: Bytes = replay.into();
        Self {
            inner,
            replay: (!replay.is_empty()).then_some(replay),
        }
    }

    /// Like [`new`](Self::new) for call sites that may not hold a connection.
    pub fn rewind(inner: Option<S>, replay: impl Into<Bytes>) -> Result<Self, ConnError> {
        let inner = inner.ok_or(ConnError::InvalidConnection)?;
        Ok(Self::new(inner, replay))
    }

    /// Bytes still waiting to be replayed.
    pub fn pending_replay(&self) -> usize {
        self.replay.as_ref().map_or(0, Bytes::len)
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap the stream. Any replay bytes not yet read are discarded.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ReplayConn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Some(replay) = this.replay.as_mut() {
            let n = replay.len().min(buf.remaining());
            buf.put_slice(&replay[..n]);
            replay.advance(n);
            if replay.is_empty() {
                this.replay = None;
            }
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: Transport> AsyncWrite for ReplayConn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    /// Close the write half only, if the transport can.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.inner.supports_half_close() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "transport does not support closing the write half",
            )));
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

impl<S: Transport> Transport for ReplayConn<S> {
    fn supports_half_close(&self) -> bool {
        self.inner.supports_half_close()
    }

    fn carries_tls_records(&self) -> bool {
        self.inner.carries_tls_records()
    }
}
