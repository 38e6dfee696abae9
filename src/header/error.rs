//! Decode errors raised while reading SMB2 headers.

use thiserror::Error;

use crate::command::Command;

/// Errors produced when an inbound header cannot be trusted.
///
/// A decode error is fatal to the reply being parsed. It never mutates the
/// credit ledger.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// Fewer bytes were available than the header layout requires.
    #[error("truncated header: have {have}, need {need}")]
    Truncated {
        /// Bytes available.
        have: usize,
        /// Bytes required.
        need: usize,
    },
    /// The first four bytes were not `\xFESMB`.
    #[error("bad protocol id {0:#010x}")]
    BadProtocolId(u32),
    /// The structure size field was not 64.
    #[error("bad header structure size {0}")]
    BadStructureSize(u16),
    /// A reply arrived without the server-to-redirector flag.
    #[error("header is not a response")]
    NotAResponse,
    /// The reply carried a different message id than the request.
    #[error("message id mismatch: expected {expected}, found {found}")]
    MessageIdMismatch { expected: u64, found: u64 },
    /// The reply carried a different command than the request.
    #[error("command mismatch: expected {expected}, found {found}")]
    CommandMismatch { expected: Command, found: Command },
    /// A compound reply pointed past the end of the buffer.
    #[error("next command offset {offset} exceeds remaining {remaining} bytes")]
    BadNextCommand { offset: u32, remaining: usize },
}
