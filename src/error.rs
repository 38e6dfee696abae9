//! Canonical error type for channel operations.
//!
//! [`ChannelError`] is what `dispatch` callers observe. Module-level errors
//! convert into it with `?`.

use thiserror::Error;

use crate::{credit::AdmissionError, header::HeaderError, header::NtStatus};

/// Top-level error surfaced by the send pipeline.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Credit admission refused the request.
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    /// A reply header was malformed or did not match its request.
    #[error("malformed reply: {0}")]
    Decode(#[from] HeaderError),
    /// The transport failed to move bytes.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// The server expired or deleted the session; recovery may be underway.
    #[error("session invalidated by server ({status})")]
    SessionInvalidated { status: NtStatus },
    /// The session failed while it was being re-established; the share must
    /// be unmounted.
    #[error("session lost during reconnect ({status}); share must be unmounted")]
    Unrecoverable { status: NtStatus },
    /// A reply that required signing failed verification.
    #[error("signature verification failed for message {message_id}")]
    SignatureInvalid { message_id: u64 },
}

impl ChannelError {
    /// Report whether the caller may retry once recovery completes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Admission(AdmissionError::WouldBlock) | Self::SessionInvalidated { .. }
        )
    }
}

/// Result alias used by the send pipeline.
pub type Result<T> = std::result::Result<T, ChannelError>;
