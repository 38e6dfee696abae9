//! Errors surfaced by credit admission.

use thiserror::Error;

/// Reasons a request could not be admitted.
///
/// Timeouts never appear here: a stalled wait escalates to a forced reconnect
/// and keeps waiting.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// Credit is exhausted and the request may not block.
    #[error("insufficient credit and the request may not block")]
    WouldBlock,
    /// The owning share or channel is being torn down.
    #[error("share or channel is going away")]
    Gone,
}
