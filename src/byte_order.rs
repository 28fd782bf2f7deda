//! Helpers for explicit network byte-order conversions.
//!
//! The frame header carries a 24-bit length and compressed routes carry a
//! 16-bit dictionary code. Keeping the conversions here scopes the Clippy
//! expectations to the points where wire endianness is decided.

/// Largest value representable by the 3-byte frame length field.
pub const MAX_U24: u32 = (1 << 24) - 1;

/// Serialise a `u16` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use playwire::byte_order::write_network_u16;
///
/// assert_eq!(write_network_u16(0x1234), [0x12, 0x34]);
/// ```
#[must_use]
pub fn write_network_u16(value: u16) -> [u8; 2] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u16` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use playwire::byte_order::read_network_u16;
///
/// assert_eq!(read_network_u16([0x12, 0x34]), 0x1234);
/// ```
#[must_use]
pub fn read_network_u16(bytes: [u8; 2]) -> u16 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u16::from_be_bytes(bytes)
}

/// Serialise the low 24 bits of `value` in network byte order.
///
/// Returns `None` when `value` does not fit in three bytes.
///
/// # Examples
///
/// ```
/// use playwire::byte_order::write_network_u24;
///
/// assert_eq!(write_network_u24(0x12_3456), Some([0x12, 0x34, 0x56]));
/// assert_eq!(write_network_u24(0x0100_0000), None);
/// ```
#[must_use]
pub fn write_network_u24(value: u32) -> Option<[u8; 3]> {
    if value > MAX_U24 {
        return None;
    }
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    let [_, hi, mid, lo] = value.to_be_bytes();
    Some([hi, mid, lo])
}

/// Parse a network-order 24-bit unsigned integer.
///
/// # Examples
///
/// ```
/// use playwire::byte_order::read_network_u24;
///
/// assert_eq!(read_network_u24([0x12, 0x34, 0x56]), 0x12_3456);
/// ```
#[must_use]
pub fn read_network_u24(bytes: [u8; 3]) -> u32 {
    let [hi, mid, lo] = bytes;
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes([0, hi, mid, lo])
}
