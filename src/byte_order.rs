//! Helpers for explicit SMB2 wire byte-order conversions.
//!
//! SMB2 encodes every header field little-endian. These helpers keep Clippy
//! expectations scoped to the conversion points so header code stays explicit
//! about wire endianness without repeating lint annotations.

/// Serialise a `u16` in SMB2 wire order (little-endian).
///
/// # Examples
///
/// ```
/// use smb2_flow::byte_order::write_wire_u16;
///
/// assert_eq!(write_wire_u16(0x1234), [0x34, 0x12]);
/// ```
#[must_use]
pub fn write_wire_u16(value: u16) -> [u8; 2] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "SMB2 header fields are little-endian on the wire."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `u16`.
#[must_use]
pub fn read_wire_u16(bytes: [u8; 2]) -> u16 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "SMB2 header fields are little-endian on the wire."
    )]
    u16::from_le_bytes(bytes)
}

/// Serialise a `u32` in SMB2 wire order (little-endian).
///
/// # Examples
///
/// ```
/// use smb2_flow::byte_order::write_wire_u32;
///
/// assert_eq!(write_wire_u32(0x424D_53FE), *b"\xFESMB");
/// ```
#[must_use]
pub fn write_wire_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "SMB2 header fields are little-endian on the wire."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `u32`.
#[must_use]
pub fn read_wire_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "SMB2 header fields are little-endian on the wire."
    )]
    u32::from_le_bytes(bytes)
}

/// Serialise a `u64` in SMB2 wire order (little-endian).
#[must_use]
pub fn write_wire_u64(value: u64) -> [u8; 8] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "SMB2 header fields are little-endian on the wire."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `u64`.
///
/// # Examples
///
/// ```
/// use smb2_flow::byte_order::read_wire_u64;
///
/// assert_eq!(read_wire_u64([0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]), 0x1122_3344_5566_7788);
/// ```
#[must_use]
pub fn read_wire_u64(bytes: [u8; 8]) -> u64 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "SMB2 header fields are little-endian on the wire."
    )]
    u64::from_le_bytes(bytes)
}
