//! Passive JA3 fingerprinting at the listener boundary.
//!
//! [`listener::Ja3Acceptor`] reads the first TLS record off each accepted
//! stream, computes its JA3, stores it by peer address, and hands the stream
//! back with the consumed bytes replayed in front so the real TLS stack never
//! notices. The entry is cleared when the connection is dropped.

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod handler;
pub mod listener;
pub mod replay;
pub mod sniff;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{FingerprintCache, FingerprintStore};
pub use config::Ja3Config;
pub use fingerprint::types::{ClientHelloInfo, Fingerprint, Ja3Result};
pub use listener::{Ja3Acceptor, Ja3Listener, TrackedConn};
pub use replay::{ConnError, ReplayConn, Transport};
pub use sniff::{RawHandshakeRecord, RecordSniffer, SniffError};
