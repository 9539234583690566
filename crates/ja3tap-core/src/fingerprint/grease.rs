/// The 16 GREASE values reserved by RFC 8701.
///
/// Ciphers, extensions and supported groups carrying one of these are left
/// out of the JA3 string so a client's random GREASE choice does not change
/// its fingerprint.
pub const GREASE_VALUES: [u16; 16] = [
    0x0A0A, 0x1A1A, 0x2A2A, 0x3A3A, 0x4A4A, 0x5A5A, 0x6A6A, 0x7A7A,
    0x8A8A, 0x9A9A, 0xAAAA, 0xBABA, 0xCACA, 0xDADA, 0xEAEA, 0xFAFA,
];

/// Check if a u16 value is one of the GREASE values.
pub fn is_grease_u16(val: u16) -> bool {
    GREASE_VALUES.contains(&val)
}

/// Iterate over the non-GREASE values of a slice, in order.
pub fn without_grease(values: &[u16]) -> impl Iterator<Item = u16> + '_ {
    values.iter().copied().filter(|v| !is_grease_u16(*v))
}
