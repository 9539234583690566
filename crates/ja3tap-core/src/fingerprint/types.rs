use std::fmt;

use serde::Serialize;

/// Parsed ClientHello information needed for JA3 fingerprinting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHelloInfo {
    /// Version from the ClientHello body (e.g., 0x0303 for TLS 1.2)
    pub tls_version: u16,
    /// Cipher suite values in wire order
    pub cipher_suites: Vec<u16>,
    /// Extension type codes in wire order, GREASE included
    pub extensions: Vec<u16>,
    /// Supported groups / named curves (from extension 0x000a)
    pub elliptic_curves: Vec<u16>,
    /// EC point format values (from extension 0x000b)
    pub ec_point_formats: Vec<u8>,
    /// Server Name Indication
    pub server_name: Option<String>,
    /// ALPN protocol values
    pub alpn_protocols: Vec<String>,
}

/// A JA3 digest: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of a JA3 fingerprint computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja3Result {
    /// MD5 digest of `raw_string`
    pub hash: Fingerprint,
    /// The bare string before hashing
    pub raw_string: String,
}
