use crate::fingerprint::types::ClientHelloInfo;
use tls_parser::nom::Err as NomErr;
use tls_parser::{
    parse_tls_extensions, parse_tls_plaintext, TlsExtension, TlsMessage, TlsMessageHandshake,
    TlsRecordType,
};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("not enough data: need at least {0} bytes")]
    NotEnoughData(usize),
    #[error("not a TLS handshake record")]
    NotHandshake,
    #[error("not a ClientHello message")]
    NotClientHello,
    #[error("TLS parse error: {0}")]
    TlsParseError(String),
}

/// Parse a raw TLS record into a `ClientHelloInfo`.
///
/// The input is the full record as read off the wire, starting with the
/// 5-byte record header.
pub fn parse_client_hello(raw: &[u8]) -> Result<ClientHelloInfo, ParseError> {
    if raw.len() < 5 {
        return Err(ParseError::NotEnoughData(5));
    }

    // Verify this is a Handshake record (content type 0x16)
    if raw[0] != 0x16 {
        return Err(ParseError::NotHandshake);
    }

    let (_, record) = parse_tls_plaintext(raw).map_err(|e| match e {
        NomErr::Incomplete(needed) => {
            let n = match needed {
                tls_parser::nom::Needed::Size(s) => s.get(),
                tls_parser::nom::Needed::Unknown => 0,
            };
            ParseError::NotEnoughData(raw.len() + n)
        }
        _ => ParseError::TlsParseError(format!("{}", e)),
    })?;

    if record.hdr.record_type != TlsRecordType::Handshake {
        return Err(ParseError::NotHandshake);
    }

    for msg in &record.msg {
        if let TlsMessage::Handshake(TlsMessageHandshake::ClientHello(ch)) = msg {
            let mut info = ClientHelloInfo {
                tls_version: ch.version.0,
                cipher_suites: ch.ciphers.iter().map(|c| c.0).collect(),
                ..Default::default()
            };

            if let Some(ext_data) = ch.ext {
                // Type codes come straight from the extension headers so that
                // GREASE and unknown extensions keep their real values.
                info.extensions = extension_types(ext_data)?;

                let extensions = match parse_tls_extensions(ext_data) {
                    Ok((rest, extensions)) if rest.is_empty() => extensions,
                    // many0 stops quietly at the first bad extension.
                    Ok((rest, _)) => {
                        return Err(ParseError::TlsParseError(format!(
                            "malformed extension with {} bytes left unparsed",
                            rest.len()
                        )))
                    }
                    Err(e) => return Err(ParseError::TlsParseError(format!("{}", e))),
                };

                for ext in &extensions {
                    match ext {
                        TlsExtension::SNI(sni_list) => {
                            for (_, name_bytes) in sni_list {
                                if let Ok(name) = std::str::from_utf8(name_bytes) {
                                    info.server_name = Some(name.to_string());
                                }
                            }
                        }
                        TlsExtension::EllipticCurves(curves) => {
                            info.elliptic_curves = curves.iter().map(|c| c.0).collect();
                        }
                        TlsExtension::EcPointFormats(formats) => {
                            info.ec_point_formats = formats.to_vec();
                        }
                        TlsExtension::ALPN(protocols) => {
                            info.alpn_protocols = protocols
                                .iter()
                                .filter_map(|p| std::str::from_utf8(p).ok())
                                .map(|s| s.to_string())
                                .collect();
                        }
                        _ => {}
                    }
                }
            }

            return Ok(info);
        }
    }

    Err(ParseError::NotClientHello)
}

/// Walk the extension block and collect each extension's type code in wire
/// order. The block must end exactly on an extension boundary.
fn extension_types(mut data: &[u8]) -> Result<Vec<u16>, ParseError> {
    let mut types = Vec::new();
    while !data.is_empty() {
        if data.len() < 4 {
            return Err(ParseError::TlsParseError(format!(
                "truncated extension header ({} bytes)",
                data.len()
            )));
        }
        let ext_type = u16::from_be_bytes([data[0], data[1]]);
        let ext_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if data.len() < 4 + ext_len {
            return Err(ParseError::TlsParseError(format!(
                "extension 0x{:04x} declares {} bytes, {} present",
                ext_type,
                ext_len,
                data.len() - 4
            )));
        }
        types.push(ext_type);
        data = &data[4 + ext_len..];
    }
    Ok(types)
}
