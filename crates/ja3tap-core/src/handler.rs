//! Lookup side: fetch a connection's JA3 once its handshake is done.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::FingerprintStore;
use crate::fingerprint::types::Fingerprint;
use crate::replay::Transport;

/// Metadata key the fingerprint is attached under.
pub const JA3_HEADER: &str = "JA3";

/// What a consumer knows about a connection when it asks for its JA3.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionMeta<'a> {
    /// Remote address in the same `ip:port` form the listener cached under.
    pub remote_addr: &'a str,
    pub handshake_complete: bool,
    /// The connection opened with a sniffable TLS record (not QUIC).
    pub tls_records: bool,
}

impl<'a> ConnectionMeta<'a> {
    pub fn for_transport<T: Transport>(
        remote_addr: &'a str,
        transport: &T,
        handshake_complete: bool,
    ) -> Self {
        Self {
            remote_addr,
            handshake_complete,
            tls_records: transport.carries_tls_records(),
        }
    }
}

pub struct Ja3Handler {
    store: Arc<dyn FingerprintStore>,
}

impl Ja3Handler {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self { store }
    }

    /// The `(name, value)` pair to attach to the request, if any.
    ///
    /// Connections that never carried a TLS record, or whose handshake has not
    /// completed, get nothing. A cache miss is logged and otherwise ignored.
    pub fn lookup(&self, meta: &ConnectionMeta<'_>) -> Option<(&'static str, Fingerprint)> {
        if !meta.tls_records || !meta.handshake_complete {
            return None;
        }

        match self.store.get(meta.remote_addr) {
            Some(ja3) => {
                debug!("Attaching JA3 to request for {}", meta.remote_addr);
                Some((JA3_HEADER, ja3))
            }
            None => {
                warn!("ClientHello missing from cache for {}", meta.remote_addr);
                None
            }
        }
    }

    /// Append the JA3 header to `headers` when one is available.
    pub fn attach(&self, meta: &ConnectionMeta<'_>, headers: &mut Vec<(String, String)>) {
        if let Some((name, ja3)) = self.lookup(meta) {
            headers.push((name.to_string(), ja3.to_string()));
        }
    }
}
