use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SNIFF_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-listener fingerprinting settings, fixed once the listener is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ja3Config {
    /// Sort extensions before hashing. Clients that shuffle their extension
    /// order on every connection (Chrome 110+) then keep one fingerprint.
    pub sort_extensions: bool,
    /// Give up on a ClientHello that has not fully arrived after this many
    /// milliseconds. `None` or 0 waits forever.
    pub sniff_timeout_ms: Option<u64>,
}

impl Default for Ja3Config {
    fn default() -> Self {
        Self {
            sort_extensions: false,
            sniff_timeout_ms: Some(DEFAULT_SNIFF_TIMEOUT_MS),
        }
    }
}

impl Ja3Config {
    /// Load from a JSON file such as `{"sort_extensions": true}`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn sniff_timeout(&self) -> Option<Duration> {
        self.sniff_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
