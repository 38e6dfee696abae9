//! Compound request chaining and chained-reply walking.
//!
//! Members of a chain are laid out back to back, each starting on an 8-byte
//! boundary. A member's `NextCommand` holds the distance from its own header
//! to the next one, padding included, and the last member carries zero.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    header::{COMPOUND_ALIGNMENT, HEADER_LEN, HeaderError, Smb2Header},
    request::{Request, RequestFlags},
};

/// Where a request sits within a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompoundPosition {
    /// Not chained.
    Only,
    First,
    Middle,
    Last,
}

impl CompoundPosition {
    /// Position of member `index` in a chain of `len` requests.
    #[must_use]
    pub const fn of(index: usize, len: usize) -> Self {
        match (index, len) {
            (_, 0 | 1) => Self::Only,
            (0, _) => Self::First,
            (i, n) if i + 1 == n => Self::Last,
            _ => Self::Middle,
        }
    }

    /// Report whether the member carries `RELATED_OPERATIONS`.
    #[must_use]
    pub const fn is_related(self) -> bool { matches!(self, Self::Middle | Self::Last) }

    /// Report whether another member follows this one.
    #[must_use]
    pub const fn has_next(self) -> bool { matches!(self, Self::First | Self::Middle) }
}

/// Zero bytes needed to bring `len` up to the compound alignment.
#[must_use]
pub const fn padding_for(len: usize) -> usize {
    match len % COMPOUND_ALIGNMENT {
        0 => 0,
        rem => COMPOUND_ALIGNMENT - rem,
    }
}

/// Encode sequenced `requests` as one compound buffer.
///
/// Each member is marked as compound, gets `RELATED_OPERATIONS` unless it is
/// first, and has its `NextCommand` patched once its padded length is known.
/// A single request encodes exactly as it would unchained.
pub fn encode_chain(requests: &mut [Request]) -> Bytes {
    let len = requests.len();
    let mut buf = BytesMut::new();
    for (index, request) in requests.iter_mut().enumerate() {
        let position = CompoundPosition::of(index, len);
        if position != CompoundPosition::Only {
            request.insert_flags(RequestFlags::COMPOUND);
        }
        if position.is_related() {
            request.insert_flags(RequestFlags::RELATED_OPERATIONS);
        }

        let slots = request.encode(&mut buf);
        if !position.has_next() {
            request.set_next_command_offset(0);
            continue;
        }
        buf.put_bytes(0, padding_for(buf.len() - slots.start()));
        let next = u32::try_from(buf.len() - slots.start()).unwrap_or(u32::MAX);
        slots.set_next_command(&mut buf, next);
        request.set_next_command_offset(next);
    }
    buf.freeze()
}

/// One member of a chained reply.
#[derive(Clone, Copy, Debug)]
pub struct SubReply<'a> {
    pub header: Smb2Header,
    /// Header and body bytes of this member, padding included.
    pub frame: &'a [u8],
}

impl<'a> SubReply<'a> {
    /// Bytes following the header.
    #[must_use]
    pub fn body(&self) -> &'a [u8] { &self.frame[HEADER_LEN..] }
}

/// Walks the members of a chained reply.
///
/// The cursor keeps a running total of `NextCommand` offsets; each member
/// begins at that total, so any padding left after the previous member is
/// skipped.
#[derive(Debug)]
pub struct CompoundReplyCursor<'a> {
    buf: &'a [u8],
    next_offset: usize,
    finished: bool,
}

impl<'a> CompoundReplyCursor<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            next_offset: 0,
            finished: buf.is_empty(),
        }
    }

    fn read_member(&mut self) -> Result<SubReply<'a>, HeaderError> {
        let start = self.next_offset;
        let rest = &self.buf[start..];
        let mut cursor = rest;
        let header = Smb2Header::decode(&mut cursor)?;
        let frame = if header.next_command == 0 {
            self.finished = true;
            rest
        } else {
            let next = usize::try_from(header.next_command).unwrap_or(usize::MAX);
            if next < HEADER_LEN || next > rest.len() {
                return Err(HeaderError::BadNextCommand {
                    offset: header.next_command,
                    remaining: rest.len(),
                });
            }
            self.next_offset = start + next;
            &rest[..next]
        };
        Ok(SubReply { header, frame })
    }
}

impl<'a> Iterator for CompoundReplyCursor<'a> {
    type Item = Result<SubReply<'a>, HeaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let member = self.read_member();
        if member.is_err() {
            self.finished = true;
        }
        Some(member)
    }
}
