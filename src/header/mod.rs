//! SMB2 wire header: layout constants, flags, status codes and the codec.
//!
//! Every constant here is part of the wire contract shared with the server
//! and must stay bit-exact.

pub mod codec;
pub mod error;
pub mod flags;
pub mod status;

pub use codec::{HeaderId, HeaderSlots, PartialHeader, Smb2Header};
pub use error::HeaderError;
pub use flags::HeaderFlags;
pub use status::NtStatus;

/// Length of an SMB2 header in bytes.
pub const HEADER_LEN: usize = 64;
/// Bytes read by the partial decode pass, through the credit response.
pub const PARTIAL_HEADER_LEN: usize = 16;
/// `\xFESMB` read as a little-endian `u32`.
pub const PROTOCOL_ID: u32 = 0x424D_53FE;
/// Value the structure size field must carry.
pub const STRUCTURE_SIZE: u16 = 64;
/// Process id written into client sync headers.
pub const CLIENT_PROCESS_ID: u32 = 0xFEFF;
/// Message id of unsolicited server notifications such as oplock breaks.
pub const UNSOLICITED_MESSAGE_ID: u64 = u64::MAX;
/// Alignment of each member of a compound chain.
pub const COMPOUND_ALIGNMENT: usize = 8;

#[cfg(test)]
mod tests;
