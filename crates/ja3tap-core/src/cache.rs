//! Peer address → JA3 lookup shared between the listener and its consumers.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::fingerprint::types::Fingerprint;

/// Where the listener keeps fingerprints for open connections.
///
/// Keys are remote addresses in `ip:port` form. A lookup that finds nothing
/// is the normal state before sniffing finishes or after the connection is
/// closed.
pub trait FingerprintStore: Send + Sync {
    /// Insert or overwrite the fingerprint for `addr`.
    fn set(&self, addr: &str, fingerprint: Fingerprint);

    fn get(&self, addr: &str) -> Option<Fingerprint>;

    /// Forget `addr`. No-op if it is not present.
    fn clear(&self, addr: &str);
}

/// In-memory [`FingerprintStore`] behind a readers-writer lock.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    ja3: RwLock<HashMap<String, Fingerprint>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections currently holding an entry.
    pub fn len(&self) -> usize {
        self.ja3.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ja3.read().is_empty()
    }
}

impl FingerprintStore for FingerprintCache {
    fn set(&self, addr: &str, fingerprint: Fingerprint) {
        let previous = self.ja3.write().insert(addr.to_string(), fingerprint);
        if let Some(previous) = previous {
            debug!("Replaced stale JA3 {} for {}", previous, addr);
        }
    }

    fn get(&self, addr: &str) -> Option<Fingerprint> {
        self.ja3.read().get(addr).cloned()
    }

    fn clear(&self, addr: &str) {
        self.ja3.write().remove(addr);
    }
}
