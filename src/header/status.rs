//! NT status codes that the crediting engine interprets.

use derive_more::{Display, From, Into};

/// NT status code carried in the SMB2 header.
///
/// Only the codes the flow-control layer reacts to are named; every other
/// value is passed through to callers untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Into)]
#[display("{_0:#010x}")]
pub struct NtStatus(u32);

impl NtStatus {
    pub const SUCCESS: Self = Self(0x0000_0000);
    /// Interim response for an operation that completes asynchronously.
    pub const PENDING: Self = Self(0x0000_0103);
    pub const BUFFER_OVERFLOW: Self = Self(0x8000_0005);
    pub const MORE_PROCESSING_REQUIRED: Self = Self(0xC000_0016);
    pub const USER_SESSION_DELETED: Self = Self(0xC000_0203);
    pub const NETWORK_SESSION_EXPIRED: Self = Self(0xC000_035C);

    #[must_use]
    pub const fn new(code: u32) -> Self { Self(code) }

    #[must_use]
    pub const fn code(self) -> u32 { self.0 }

    #[must_use]
    pub const fn is_success(self) -> bool { self.0 == 0 }

    /// Report whether the server has invalidated the session or its user.
    ///
    /// # Examples
    ///
    /// ```
    /// use smb2_flow::header::NtStatus;
    ///
    /// assert!(NtStatus::NETWORK_SESSION_EXPIRED.invalidates_session());
    /// assert!(!NtStatus::PENDING.invalidates_session());
    /// ```
    #[must_use]
    pub const fn invalidates_session(self) -> bool {
        self.0 == Self::NETWORK_SESSION_EXPIRED.0 || self.0 == Self::USER_SESSION_DELETED.0
    }
}
