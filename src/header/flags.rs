//! Bit flags carried in the `Flags` field of the SMB2 header.

use std::fmt;

use derive_more::{From, Into};

/// Set of SMB2 header flags.
///
/// # Examples
///
/// ```
/// use smb2_flow::header::HeaderFlags;
///
/// let flags = HeaderFlags::ASYNC_COMMAND | HeaderFlags::SIGNED;
/// assert!(flags.contains(HeaderFlags::SIGNED));
/// assert!(!flags.contains(HeaderFlags::RELATED_OPERATIONS));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, From, Into)]
pub struct HeaderFlags(u32);

impl HeaderFlags {
    /// No flags set.
    pub const EMPTY: Self = Self(0);
    /// The message is a response.
    pub const SERVER_TO_REDIR: Self = Self(0x0000_0001);
    /// The header uses the async layout.
    pub const ASYNC_COMMAND: Self = Self(0x0000_0002);
    /// The request belongs to a related compound chain.
    pub const RELATED_OPERATIONS: Self = Self(0x0000_0004);
    /// The message is signed.
    pub const SIGNED: Self = Self(0x0000_0008);
    /// The request targets a DFS namespace.
    pub const DFS_OPERATIONS: Self = Self(0x1000_0000);
    /// The request is a replay of an earlier one.
    pub const REPLAY_OPERATION: Self = Self(0x2000_0000);

    /// Build a flag set from its raw wire value.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self { Self(bits) }

    /// Return the raw wire value.
    #[must_use]
    pub const fn bits(self) -> u32 { self.0 }

    /// Report whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    /// Set every bit of `other`.
    pub fn insert(&mut self, other: Self) { self.0 |= other.0; }

    /// Clear every bit of `other`.
    pub fn remove(&mut self, other: Self) { self.0 &= !other.0; }
}

impl std::ops::BitOr for HeaderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl std::ops::BitOrAssign for HeaderFlags {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

impl fmt::Debug for HeaderFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeaderFlags({:#010x})", self.0)
    }
}
