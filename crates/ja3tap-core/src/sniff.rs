//! Reads exactly one TLS record off a live stream.
//!
//! Nothing past the record boundary is touched, and every byte that was
//! consumed stays available from the [`RecordSniffer`] so it can be replayed
//! to whoever reads the stream next.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::fingerprint::clienthello::ParseError;

/// Content type byte 0 + version 1..3 + length 3..5.
pub const RECORD_HEADER_LEN: usize = 5;
pub const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;

const READ_CHUNK: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum SniffError {
    #[error("not a TLS handshake record (content type 0x{content_type:02x})")]
    NotAHandshake { content_type: u8 },
    #[error("stream ended after {got} of {needed} bytes")]
    ShortRead { needed: usize, got: usize },
    #[error("I/O error while sniffing: {0}")]
    Io(#[from] io::Error),
    #[error("malformed ClientHello: {0}")]
    Decode(#[from] ParseError),
}

/// One complete TLS handshake record: header followed by its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHandshakeRecord(Bytes);

impl RawHandshakeRecord {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Record-layer version (not validated).
    pub fn version(&self) -> u16 {
        u16::from_be_bytes([self.0[1], self.0[2]])
    }

    pub fn body(&self) -> &[u8] {
        &self.0[RECORD_HEADER_LEN..]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Incrementally reads a ClientHello record and owns the bytes it consumed.
///
/// The buffer lives outside the read future, so dropping that future (for
/// example on a timeout) leaves the partial read intact in
/// [`consumed`](Self::consumed).
#[derive(Debug, Default)]
pub struct RecordSniffer {
    buf: Vec<u8>,
    record: Option<Bytes>,
    needed: usize,
}

impl RecordSniffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the 5-byte header, check for a handshake record, then read exactly
    /// the declared body length.
    pub async fn read_client_hello<R>(
        &mut self,
        reader: &mut R,
    ) -> Result<RawHandshakeRecord, SniffError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if let Some(record) = &self.record {
            return Ok(RawHandshakeRecord(record.clone()));
        }

        self.fill_to(reader, RECORD_HEADER_LEN).await?;

        if self.buf[0] != CONTENT_TYPE_HANDSHAKE {
            return Err(SniffError::NotAHandshake {
                content_type: self.buf[0],
            });
        }

        let body_len = u16::from_be_bytes([self.buf[3], self.buf[4]]) as usize;
        self.fill_to(reader, RECORD_HEADER_LEN + body_len).await?;

        let record = Bytes::from(std::mem::take(&mut self.buf));
        self.record = Some(record.clone());
        Ok(RawHandshakeRecord(record))
    }

    /// Bytes taken off the stream so far.
    pub fn consumed(&self) -> &[u8] {
        match &self.record {
            Some(record) => record,
            None => &self.buf,
        }
    }

    /// How many bytes the sniffer is currently waiting to have in total.
    pub fn needed(&self) -> usize {
        self.needed
    }

    /// Hand over the consumed bytes for replay.
    pub fn into_consumed(self) -> Bytes {
        match self.record {
            Some(record) => record,
            None => Bytes::from(self.buf),
        }
    }

    async fn fill_to<R>(&mut self, reader: &mut R, len: usize) -> Result<(), SniffError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.needed = len;
        let mut chunk = [0u8; READ_CHUNK];
        while self.buf.len() < len {
            let want = (len - self.buf.len()).min(READ_CHUNK);
            let n = reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(SniffError::ShortRead {
                    needed: len,
                    got: self.buf.len(),
                });
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn reads_exactly_one_record() {
        let data = [0x16, 0x03, 0x01, 0x00, 0x02, 0xAA, 0xBB, 0x17, 0x17];
        let mut reader: &[u8] = &data;
        let mut sniffer = RecordSniffer::new();

        let record = sniffer.read_client_hello(&mut reader).await.unwrap();

        assert_eq!(record.as_bytes(), &data[..7]);
        assert_eq!(record.version(), 0x0301);
        assert_eq!(record.body(), &[0xAAu8, 0xBB][..]);
        assert_eq!(sniffer.consumed(), &data[..7]);
        // Bytes after the record are left on the stream
        assert_eq!(reader, &[0x17u8, 0x17][..]);
    }

    #[tokio::test]
    async fn non_handshake_keeps_header() {
        let data = [0x17, 0x03, 0x03, 0x00, 0x20, 0x01, 0x02];
        let mut reader: &[u8] = &data;
        let mut sniffer = RecordSniffer::new();

        let err = sniffer.read_client_hello(&mut reader).await.unwrap_err();

        assert!(matches!(err, SniffError::NotAHandshake { content_type: 0x17 }));
        assert_eq!(sniffer.consumed(), &data[..5]);
        assert_eq!(reader, &[0x01u8, 0x02][..]);
    }

    #[tokio::test]
    async fn short_header_is_short_read() {
        let mut reader: &[u8] = &[0x16, 0x03, 0x01];
        let mut sniffer = RecordSniffer::new();

        let err = sniffer.read_client_hello(&mut reader).await.unwrap_err();

        assert!(matches!(err, SniffError::ShortRead { needed: 5, got: 3 }));
        assert_eq!(sniffer.into_consumed(), Bytes::from_static(&[0x16, 0x03, 0x01]));
    }

    #[tokio::test]
    async fn short_body_is_short_read() {
        let mut reader: &[u8] = &[0x16, 0x03, 0x01, 0x00, 0x04, 0xAA];
        let mut sniffer = RecordSniffer::new();

        let err = sniffer.read_client_hello(&mut reader).await.unwrap_err();

        assert!(matches!(err, SniffError::ShortRead { needed: 9, got: 6 }));
        assert_eq!(sniffer.consumed().len(), 6);
    }

    #[tokio::test]
    async fn empty_body_record() {
        let mut reader: &[u8] = &[0x16, 0x03, 0x03, 0x00, 0x00];
        let mut sniffer = RecordSniffer::new();

        let record = sniffer.read_client_hello(&mut reader).await.unwrap();
        assert_eq!(record.len(), 5);
        assert!(record.body().is_empty());
    }

    #[tokio::test]
    async fn cancelled_read_keeps_partial_bytes() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x16, 0x03, 0x01, 0x01, 0x00, 0x01]).await.unwrap();

        let mut sniffer = RecordSniffer::new();
        let res = tokio::time::timeout(
            Duration::from_millis(50),
            sniffer.read_client_hello(&mut server),
        )
        .await;

        assert!(res.is_err());
        assert_eq!(sniffer.consumed(), &[0x16u8, 0x03, 0x01, 0x01, 0x00, 0x01][..]);
        assert_eq!(sniffer.needed(), 5 + 0x100);
    }

    #[tokio::test]
    async fn record_spanning_many_reads() {
        let mut data = vec![0x16, 0x03, 0x01, 0x20, 0x00];
        data.extend(std::iter::repeat(0x5A).take(0x2000));
        let (mut client, mut server) = tokio::io::duplex(100);
        let expected = data.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&data).await.unwrap();
            client
        });

        let mut sniffer = RecordSniffer::new();
        let record = sniffer.read_client_hello(&mut server).await.unwrap();
        let _client = writer.await.unwrap();

        assert_eq!(record.as_bytes(), &expected[..]);
    }
}
