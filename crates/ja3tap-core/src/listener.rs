//! Listener-side orchestration: sniff, fingerprint, cache, replay, clean up.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::FingerprintStore;
use crate::config::Ja3Config;
use crate::fingerprint::clienthello::parse_client_hello;
use crate::fingerprint::ja3::compute_ja3;
use crate::fingerprint::types::{ClientHelloInfo, Fingerprint, Ja3Result};
use crate::replay::{ReplayConn, Transport};
use crate::sniff::{RecordSniffer, SniffError};

/// Fingerprints accepted connections and hands them back untouched.
///
/// Settings are copied out of [`Ja3Config`] at construction and never change
/// afterwards, so two acceptors with different settings can share a store.
#[derive(Clone)]
pub struct Ja3Acceptor {
    store: Arc<dyn FingerprintStore>,
    sort_extensions: bool,
    sniff_timeout: Option<Duration>,
}

impl Ja3Acceptor {
    pub fn new(store: Arc<dyn FingerprintStore>, config: &Ja3Config) -> Self {
        Self {
            store,
            sort_extensions: config.sort_extensions,
            sniff_timeout: config.sniff_timeout(),
        }
    }

    pub fn store(&self) -> &Arc<dyn FingerprintStore> {
        &self.store
    }

    /// Sniff the ClientHello off `stream`, cache its JA3 under `peer`, and
    /// return the stream with the consumed bytes put back in front.
    ///
    /// Never fails: a stream that does not start with a readable ClientHello
    /// is returned without a fingerprint. The fingerprint is in the store
    /// before this returns.
    pub async fn wrap<S: Transport>(&self, mut stream: S, peer: SocketAddr) -> TrackedConn<S> {
        let addr = peer.to_string();
        let cleanup = CacheCleanup {
            store: Arc::clone(&self.store),
            addr: addr.clone(),
        };

        if !stream.carries_tls_records() {
            debug!("Transport has no TLS record layer, not sniffing {}", addr);
            return TrackedConn {
                conn: ReplayConn::new(stream, Bytes::new()),
                peer,
                fingerprint: None,
                _cleanup: cleanup,
            };
        }

        let mut sniffer = RecordSniffer::new();
        let fingerprint = match self.sniff(&mut sniffer, &mut stream).await {
            Ok((info, ja3)) => {
                debug!(
                    "Cached JA3 {} for {} (sni: {}, alpn: [{}], raw: {})",
                    ja3.hash,
                    addr,
                    info.server_name.as_deref().unwrap_or("(none)"),
                    info.alpn_protocols.join(", "),
                    ja3.raw_string
                );
                self.store.set(&addr, ja3.hash.clone());
                Some(ja3.hash)
            }
            Err(e) => {
                debug!("Failed to read ClientHello from {}: {}", addr, e);
                None
            }
        };

        TrackedConn {
            conn: ReplayConn::new(stream, sniffer.into_consumed()),
            peer,
            fingerprint,
            _cleanup: cleanup,
        }
    }

    async fn sniff<S: Transport>(
        &self,
        sniffer: &mut RecordSniffer,
        stream: &mut S,
    ) -> Result<(ClientHelloInfo, Ja3Result), SniffError> {
        let record = match self.sniff_timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, sniffer.read_client_hello(stream)).await;
                match timed {
                    Ok(res) => res?,
                    // A stalled client is treated like one that hung up.
                    Err(_) => {
                        return Err(SniffError::ShortRead {
                            needed: sniffer.needed(),
                            got: sniffer.consumed().len(),
                        })
                    }
                }
            }
            None => sniffer.read_client_hello(stream).await?,
        };

        let info = parse_client_hello(record.as_bytes())?;
        let ja3 = compute_ja3(&info, self.sort_extensions);
        Ok((info, ja3))
    }
}

/// Clears the connection's store entry when dropped.
struct CacheCleanup {
    store: Arc<dyn FingerprintStore>,
    addr: String,
}

impl Drop for CacheCleanup {
    fn drop(&mut self) {
        self.store.clear(&self.addr);
        debug!("Disposing of JA3 for {}", self.addr);
    }
}

/// An accepted connection after sniffing.
///
/// Reads start with the bytes the sniffer consumed. Dropping it, or calling
/// [`close`](Self::close), closes the stream and clears the cache entry for
/// its peer address exactly once.
pub struct TrackedConn<S> {
    conn: ReplayConn<S>,
    peer: SocketAddr,
    fingerprint: Option<Fingerprint>,
    _cleanup: CacheCleanup,
}

impl<S> TrackedConn<S> {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// The JA3 computed at accept time, if sniffing succeeded.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn get_ref(&self) -> &S {
        self.conn.get_ref()
    }

    /// Bytes still waiting to be replayed.
    pub fn pending_replay(&self) -> usize {
        self.conn.pending_replay()
    }

    /// Close the connection and clear its cache entry.
    pub fn close(self) {
        drop(self);
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TrackedConn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().conn).poll_read(cx, buf)
    }
}

impl<S: Transport> AsyncWrite for TrackedConn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().conn).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().conn).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.conn.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().conn).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().conn).poll_shutdown(cx)
    }
}

impl<S: Transport> Transport for TrackedConn<S> {
    fn supports_half_close(&self) -> bool {
        self.conn.supports_half_close()
    }

    fn carries_tls_records(&self) -> bool {
        self.conn.carries_tls_records()
    }
}

/// A TCP listener whose `accept` returns connections already fingerprinted.
///
/// Each accepted stream is sniffed on its own task, and `accept` hands back
/// whichever connection finishes first, so a client that is slow to send its
/// ClientHello does not hold up the ones behind it.
pub struct Ja3Listener {
    listener: TcpListener,
    acceptor: Ja3Acceptor,
    sniffing: JoinSet<TrackedConn<TcpStream>>,
}

impl Ja3Listener {
    pub fn new(listener: TcpListener, acceptor: Ja3Acceptor) -> Self {
        Self {
            listener,
            acceptor,
            sniffing: JoinSet::new(),
        }
    }

    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        store: Arc<dyn FingerprintStore>,
        config: &Ja3Config,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, Ja3Acceptor::new(store, config)))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn acceptor(&self) -> &Ja3Acceptor {
        &self.acceptor
    }

    /// Connections accepted but still being sniffed.
    pub fn in_flight(&self) -> usize {
        self.sniffing.len()
    }

    /// Return the next connection whose sniff has finished. Only errors from
    /// the underlying accept are returned.
    ///
    /// Cancel safe: a connection accepted during a cancelled call stays queued
    /// for the next one. Dropping the listener abandons connections still in
    /// flight and clears their cache entries.
    pub async fn accept(&mut self) -> io::Result<TrackedConn<TcpStream>> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    let acceptor = self.acceptor.clone();
                    self.sniffing.spawn(async move { acceptor.wrap(stream, peer).await });
                }
                Some(done) = self.sniffing.join_next(), if !self.sniffing.is_empty() => {
                    match done {
                        Ok(conn) => return Ok(conn),
                        Err(e) => warn!("Sniffing task failed: {}", e),
                    }
                }
            }
        }
    }
}
