//! Builders for hand-made ClientHello records used across the test modules.

pub struct ClientHelloBuilder {
    version: u16,
    ciphers: Vec<u16>,
    extensions: Vec<(u16, Vec<u8>)>,
}

impl Default for ClientHelloBuilder {
    fn default() -> Self {
        Self {
            version: 0x0303,
            ciphers: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl ClientHelloBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ciphers(mut self, ciphers: &[u16]) -> Self {
        self.ciphers = ciphers.to_vec();
        self
    }

    /// Append an extension with its data written as given, valid or not.
    pub fn raw_extension(mut self, ext_type: u16, data: &[u8]) -> Self {
        self.extensions.push((ext_type, data.to_vec()));
        self
    }

    pub fn grease_extension(mut self, ext_type: u16) -> Self {
        self.extensions.push((ext_type, Vec::new()));
        self
    }

    pub fn server_name(mut self, name: &str) -> Self {
        let mut entry = vec![0x00];
        entry.extend_from_slice(&(name.len() as u16).to_be_bytes());
        entry.extend_from_slice(name.as_bytes());
        self.extensions.push((0x0000, with_u16_len(&entry)));
        self
    }

    pub fn supported_groups(mut self, groups: &[u16]) -> Self {
        let list: Vec<u8> = groups.iter().flat_map(|g| g.to_be_bytes()).collect();
        self.extensions.push((0x000a, with_u16_len(&list)));
        self
    }

    pub fn point_formats(mut self, points: &[u8]) -> Self {
        let mut data = vec![points.len() as u8];
        data.extend_from_slice(points);
        self.extensions.push((0x000b, data));
        self
    }

    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        let mut list = Vec::new();
        for p in protocols {
            list.push(p.len() as u8);
            list.extend_from_slice(p.as_bytes());
        }
        self.extensions.push((0x0010, with_u16_len(&list)));
        self
    }

    /// The full record: 5-byte header followed by the handshake message.
    pub fn build(self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.version.to_be_bytes());
        body.extend_from_slice(&[0x42; 32]); // random
        body.push(0); // empty session id
        let ciphers: Vec<u8> = self.ciphers.iter().flat_map(|c| c.to_be_bytes()).collect();
        body.extend_from_slice(&with_u16_len(&ciphers));
        body.extend_from_slice(&[0x01, 0x00]); // null compression only
        if !self.extensions.is_empty() {
            let mut exts = Vec::new();
            for (ext_type, data) in &self.extensions {
                exts.extend_from_slice(&ext_type.to_be_bytes());
                exts.extend_from_slice(&with_u16_len(data));
            }
            body.extend_from_slice(&with_u16_len(&exts));
        }

        let mut handshake = vec![0x01];
        handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        handshake.extend_from_slice(&body);

        let mut record = vec![0x16, 0x03, 0x01];
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }
}

fn with_u16_len(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(data);
    out
}

/// A duplex stream with switchable transport capabilities.
pub struct MockTransport {
    io: tokio::io::DuplexStream,
    half_close: bool,
    tls_records: bool,
}

impl MockTransport {
    pub fn new(io: tokio::io::DuplexStream) -> Self {
        Self {
            io,
            half_close: true,
            tls_records: true,
        }
    }

    pub fn without_half_close(mut self) -> Self {
        self.half_close = false;
        self
    }

    pub fn without_tls_records(mut self) -> Self {
        self.tls_records = false;
        self
    }
}

impl tokio::io::AsyncRead for MockTransport {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for MockTransport {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

impl crate::replay::Transport for MockTransport {
    fn supports_half_close(&self) -> bool {
        self.half_close
    }

    fn carries_tls_records(&self) -> bool {
        self.tls_records
    }
}
