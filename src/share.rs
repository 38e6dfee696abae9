//! Interface to the session and share that own a request.
//!
//! The flow-control layer never manages sessions itself. It copies
//! identifiers into headers at build time and polls [`ShareContext::going_away`]
//! while a request waits for credit.

/// Read-only view of the session/share a request is issued against.
pub trait ShareContext: Send + Sync {
    /// Session id stamped into request headers.
    fn session_id(&self) -> u64;

    /// Tree id stamped into requests that carry one.
    fn tree_id(&self) -> u32;

    /// Report whether the share is being torn down.
    fn going_away(&self) -> bool;

    /// Report whether traffic on this share is encrypted.
    ///
    /// Encrypted replies are authenticated by the transform layer, so their
    /// signatures are never checked here.
    fn encrypted(&self) -> bool { false }

    /// Report whether the session requires every reply to be signed.
    fn signing_required(&self) -> bool { false }
}
