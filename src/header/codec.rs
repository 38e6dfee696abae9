//! Encoder and two-pass decoder for the 64-byte SMB2 header.
//!
//! Encoding returns [`HeaderSlots`], a record of where each late-bound field
//! lives in the output buffer. Compound chaining and signing patch those
//! ranges in place once their values are known, without re-serialising the
//! header.
//!
//! Decoding runs in two passes. [`Smb2Header::decode_partial`] stops after the
//! credit response so granted credits can reach the ledger before signature
//! verification. [`Smb2Header::decode`] reads the full layout.

use bytes::{BufMut, BytesMut};

use super::{
    CLIENT_PROCESS_ID,
    HEADER_LEN,
    HeaderError,
    HeaderFlags,
    NtStatus,
    PARTIAL_HEADER_LEN,
    PROTOCOL_ID,
    STRUCTURE_SIZE,
};
use crate::{
    byte_order::{
        read_wire_u16,
        read_wire_u32,
        read_wire_u64,
        write_wire_u16,
        write_wire_u32,
        write_wire_u64,
    },
    command::Command,
};

const CREDIT_CHARGE_OFFSET: usize = 6;
const CREDIT_OFFSET: usize = 14;
const FLAGS_OFFSET: usize = 16;
const NEXT_COMMAND_OFFSET: usize = 20;
const MESSAGE_ID_OFFSET: usize = 24;
const SIGNATURE_OFFSET: usize = 48;

/// Identifier block at offset 32, which depends on the header layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderId {
    /// Sync layout: process id then tree id.
    Sync { process_id: u32, tree_id: u32 },
    /// Async layout: an 8-byte async id.
    Async { async_id: u64 },
}

/// Fields read by the partial pass, through the credit response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartialHeader {
    pub credit_charge: u16,
    pub status: NtStatus,
    pub command: Command,
    /// Credits granted by the server.
    pub credits: u16,
}

/// Decoded or to-be-encoded SMB2 header.
///
/// `credits` is the credit request on outbound headers and the credit
/// response on inbound ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Smb2Header {
    pub credit_charge: u16,
    pub status: NtStatus,
    pub command: Command,
    pub credits: u16,
    pub flags: HeaderFlags,
    pub next_command: u32,
    pub message_id: u64,
    pub id: HeaderId,
    pub session_id: u64,
    pub signature: [u8; 16],
}

impl Smb2Header {
    /// Create a sync request header for `command` with client defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use smb2_flow::{command::Command, header::Smb2Header};
    ///
    /// let header = Smb2Header::request(Command::ECHO);
    /// assert_eq!(header.tree_id(), Some(0));
    /// assert!(!header.is_async());
    /// ```
    #[must_use]
    pub const fn request(command: Command) -> Self {
        Self {
            credit_charge: 0,
            status: NtStatus::SUCCESS,
            command,
            credits: 0,
            flags: HeaderFlags::EMPTY,
            next_command: 0,
            message_id: 0,
            id: HeaderId::Sync {
                process_id: CLIENT_PROCESS_ID,
                tree_id: 0,
            },
            session_id: 0,
            signature: [0; 16],
        }
    }

    #[must_use]
    pub const fn is_async(&self) -> bool { matches!(self.id, HeaderId::Async { .. }) }

    #[must_use]
    pub const fn tree_id(&self) -> Option<u32> {
        match self.id {
            HeaderId::Sync { tree_id, .. } => Some(tree_id),
            HeaderId::Async { .. } => None,
        }
    }

    #[must_use]
    pub const fn async_id(&self) -> Option<u64> {
        match self.id {
            HeaderId::Async { async_id } => Some(async_id),
            HeaderId::Sync { .. } => None,
        }
    }

    /// Append the 64-byte wire form of this header to `dst`.
    ///
    /// The async flag is derived from [`HeaderId`] so the layout and the flag
    /// cannot disagree.
    pub fn encode(&self, dst: &mut BytesMut) -> HeaderSlots {
        let start = dst.len();
        let mut flags = self.flags;
        match self.id {
            HeaderId::Sync { .. } => flags.remove(HeaderFlags::ASYNC_COMMAND),
            HeaderId::Async { .. } => flags.insert(HeaderFlags::ASYNC_COMMAND),
        }
        dst.reserve(HEADER_LEN);
        dst.put_slice(&write_wire_u32(PROTOCOL_ID));
        dst.put_slice(&write_wire_u16(STRUCTURE_SIZE));
        dst.put_slice(&write_wire_u16(self.credit_charge));
        dst.put_slice(&write_wire_u32(self.status.code()));
        dst.put_slice(&write_wire_u16(self.command.opcode()));
        dst.put_slice(&write_wire_u16(self.credits));
        dst.put_slice(&write_wire_u32(flags.bits()));
        dst.put_slice(&write_wire_u32(self.next_command));
        dst.put_slice(&write_wire_u64(self.message_id));
        match self.id {
            HeaderId::Sync {
                process_id,
                tree_id,
            } => {
                dst.put_slice(&write_wire_u32(process_id));
                dst.put_slice(&write_wire_u32(tree_id));
            }
            HeaderId::Async { async_id } => dst.put_slice(&write_wire_u64(async_id)),
        }
        dst.put_slice(&write_wire_u64(self.session_id));
        dst.put_slice(&self.signature);
        HeaderSlots { start }
    }

    /// Read the leading fields through the credit response.
    ///
    /// `src` advances past the bytes read. Callers that need to re-read the
    /// header later pass a copy of their cursor.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when the buffer is short, the protocol id is
    /// wrong, or the structure size is not 64.
    pub fn decode_partial(src: &mut &[u8]) -> Result<PartialHeader, HeaderError> {
        ensure_len(src, PARTIAL_HEADER_LEN)?;
        let protocol_id = read_wire_u32(take(src)?);
        if protocol_id != PROTOCOL_ID {
            return Err(HeaderError::BadProtocolId(protocol_id));
        }
        let structure_size = read_wire_u16(take(src)?);
        if structure_size != STRUCTURE_SIZE {
            return Err(HeaderError::BadStructureSize(structure_size));
        }
        Ok(PartialHeader {
            credit_charge: read_wire_u16(take(src)?),
            status: NtStatus::new(read_wire_u32(take(src)?)),
            command: Command::new(read_wire_u16(take(src)?)),
            credits: read_wire_u16(take(src)?),
        })
    }

    /// Read a complete header, advancing `src` by 64 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] under the same conditions as
    /// [`decode_partial`](Self::decode_partial), or when fewer than 64 bytes
    /// are available.
    pub fn decode(src: &mut &[u8]) -> Result<Self, HeaderError> {
        ensure_len(src, HEADER_LEN)?;
        let partial = Self::decode_partial(src)?;
        let flags = HeaderFlags::from_bits(read_wire_u32(take(src)?));
        let next_command = read_wire_u32(take(src)?);
        let message_id = read_wire_u64(take(src)?);
        let id = if flags.contains(HeaderFlags::ASYNC_COMMAND) {
            HeaderId::Async {
                async_id: read_wire_u64(take(src)?),
            }
        } else {
            HeaderId::Sync {
                process_id: read_wire_u32(take(src)?),
                tree_id: read_wire_u32(take(src)?),
            }
        };
        let session_id = read_wire_u64(take(src)?);
        let signature = take::<16>(src)?;
        Ok(Self {
            credit_charge: partial.credit_charge,
            status: partial.status,
            command: partial.command,
            credits: partial.credits,
            flags,
            next_command,
            message_id,
            id,
            session_id,
            signature,
        })
    }
}

fn ensure_len(src: &[u8], need: usize) -> Result<(), HeaderError> {
    if src.len() < need {
        return Err(HeaderError::Truncated {
            have: src.len(),
            need,
        });
    }
    Ok(())
}

fn take<'a, const N: usize>(src: &mut &'a [u8]) -> Result<[u8; N], HeaderError> {
    let current: &'a [u8] = src;
    let (head, rest) = current
        .split_first_chunk::<N>()
        .ok_or(HeaderError::Truncated {
            have: current.len(),
            need: N,
        })?;
    *src = rest;
    Ok(*head)
}

/// Byte ranges of late-bound header fields inside an encoded buffer.
///
/// Each setter overwrites the field in place. `buf` must be the buffer the
/// header was encoded into, or a copy with the same layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderSlots {
    start: usize,
}

impl HeaderSlots {
    /// Offset of the header within its buffer.
    #[must_use]
    pub const fn start(&self) -> usize { self.start }

    pub fn set_credit_charge(&self, buf: &mut [u8], value: u16) {
        self.patch(buf, CREDIT_CHARGE_OFFSET, &write_wire_u16(value));
    }

    pub fn set_credits(&self, buf: &mut [u8], value: u16) {
        self.patch(buf, CREDIT_OFFSET, &write_wire_u16(value));
    }

    pub fn set_next_command(&self, buf: &mut [u8], value: u32) {
        self.patch(buf, NEXT_COMMAND_OFFSET, &write_wire_u32(value));
    }

    pub fn set_message_id(&self, buf: &mut [u8], value: u64) {
        self.patch(buf, MESSAGE_ID_OFFSET, &write_wire_u64(value));
    }

    pub fn set_signature(&self, buf: &mut [u8], value: &[u8; 16]) {
        self.patch(buf, SIGNATURE_OFFSET, value);
    }

    /// Set additional flag bits, keeping those already encoded.
    pub fn insert_flags(&self, buf: &mut [u8], flags: HeaderFlags) {
        let at = self.start + FLAGS_OFFSET;
        let mut current = [0u8; 4];
        current.copy_from_slice(&buf[at..at + 4]);
        let mut merged = HeaderFlags::from_bits(read_wire_u32(current));
        merged.insert(flags);
        self.patch(buf, FLAGS_OFFSET, &write_wire_u32(merged.bits()));
    }

    fn patch(&self, buf: &mut [u8], offset: usize, bytes: &[u8]) {
        let at = self.start + offset;
        buf[at..at + bytes.len()].copy_from_slice(bytes);
    }
}
