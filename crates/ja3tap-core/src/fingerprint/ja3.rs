use std::borrow::Cow;
use std::fmt::{Display, Write};

use md5::{Digest, Md5};

use crate::fingerprint::grease::without_grease;
use crate::fingerprint::types::{ClientHelloInfo, Fingerprint, Ja3Result};

const FIELD_SEP: char = ',';
const VALUE_SEP: char = '-';

/// Compute the JA3 fingerprint from a parsed ClientHello.
///
/// JA3 format: MD5(SSLVersion,Ciphers,Extensions,EllipticCurves,EcPointFormats)
///
/// - Fields separated by commas, empty fields keep their comma
/// - Values within each field separated by dashes
/// - GREASE values filtered from ciphers, extensions and curves
/// - All values in decimal
/// - Extensions sorted ascending first when `sort_extensions` is set
pub fn compute_ja3(info: &ClientHelloInfo, sort_extensions: bool) -> Ja3Result {
    let raw_string = bare_string(info, sort_extensions);
    let hash = digest(raw_string.as_bytes());
    Ja3Result { hash, raw_string }
}

/// Build the bare JA3 string that gets hashed.
pub fn canonicalize(info: &ClientHelloInfo, sort_extensions: bool) -> Vec<u8> {
    bare_string(info, sort_extensions).into_bytes()
}

/// MD5 of a bare string, as 32 lowercase hex characters.
pub fn digest(bare: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(&Md5::digest(bare))
}

fn bare_string(info: &ClientHelloInfo, sort_extensions: bool) -> String {
    // u16 renders to at most 5 digits, u8 to 3, plus a separator each
    let mut bare = String::with_capacity(
        6 + 6 * (info.cipher_suites.len() + info.extensions.len() + info.elliptic_curves.len())
            + 4 * info.ec_point_formats.len(),
    );

    let mut extensions = Cow::Borrowed(info.extensions.as_slice());
    if sort_extensions {
        extensions.to_mut().sort_unstable();
    }

    push_values(&mut bare, [info.tls_version]);
    bare.push(FIELD_SEP);
    push_values(&mut bare, without_grease(&info.cipher_suites));
    bare.push(FIELD_SEP);
    push_values(&mut bare, without_grease(&extensions));
    bare.push(FIELD_SEP);
    push_values(&mut bare, without_grease(&info.elliptic_curves));
    bare.push(FIELD_SEP);
    push_values(&mut bare, info.ec_point_formats.iter());

    bare
}

fn push_values<I>(bare: &mut String, values: I)
where
    I: IntoIterator,
    I::Item: Display,
{
    for (i, v) in values.into_iter().enumerate() {
        if i > 0 {
            bare.push(VALUE_SEP);
        }
        // Writing into a String cannot fail.
        let _ = write!(bare, "{}", v);
    }
}
