//! Escalation when admission stalls or the server drops the session.
//!
//! The flow-control layer never reconnects by itself. It asks an external
//! [`Reconnect`] collaborator to re-establish the channel and decides how a
//! session failure is reported to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use derive_more::Display;
use log::warn;

use crate::{channel::Channel, error::ChannelError, header::NtStatus, request::Request};

/// Identifies one reconnect trial on a channel.
///
/// Requests built while a trial is in flight carry its token so bootstrap
/// commands can bypass ordinary admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display("trial-{_0}")]
pub struct TrialToken(u64);

impl TrialToken {
    pub(crate) const fn new(seq: u64) -> Self { Self(seq) }
}

/// Re-establishes a channel on behalf of the flow-control layer.
///
/// Implementations typically tear down the transport, renegotiate, and then
/// call [`Channel::reestablish`] followed by [`Channel::start`]. The credit
/// lock is never held while this runs, so implementations may call back into
/// the channel freely.
#[async_trait]
pub trait Reconnect: Send + Sync {
    async fn force_reconnect(&self, channel: &Channel);
}

/// How a session failure is handled for a given channel and request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escalation {
    /// Report the failure without reconnecting.
    Surface,
    /// Reconnect, then report the failure unchanged.
    ForceReconnect,
    /// The session died while being re-established; report it as fatal.
    Unmount,
}

impl Escalation {
    /// Pick the escalation for a session failure.
    ///
    /// An alternate channel still in its own trial cannot reconnect without
    /// waiting on itself. A primary channel whose failing request belongs to
    /// the active trial has nothing left to fall back to.
    #[must_use]
    pub const fn decide(alternate: bool, channel_in_trial: bool, request_in_trial: bool) -> Self {
        match (alternate, channel_in_trial, request_in_trial) {
            (true, true, _) => Self::Surface,
            (false, _, true) => Self::Unmount,
            _ => Self::ForceReconnect,
        }
    }
}

impl Channel {
    /// Ask the reconnect collaborator to re-establish this channel.
    ///
    /// Must be called without the credit lock held. Safe to call from a task
    /// that is itself waiting in admission.
    pub async fn force_reconnect(&self) {
        warn!("forcing reconnect of {}", self.id());
        crate::metrics::inc_forced_reconnects();
        let reconnect = Arc::clone(self.reconnector());
        reconnect.force_reconnect(self).await;
    }

    /// React to a reply carrying a session-invalidating `status`.
    ///
    /// Returns the error the caller should see, after forcing a reconnect
    /// where that is safe.
    pub async fn escalate(&self, request: &Request, status: NtStatus) -> ChannelError {
        let escalation = {
            let ledger = self.lock_ledger();
            Escalation::decide(
                self.is_alternate(),
                ledger.trial().is_some(),
                ledger.in_trial(request.trial()),
            )
        };
        tracing::warn!(
            channel = %self.id(),
            status = %status,
            command = %request.command(),
            message_id = request.message_id(),
            ?escalation,
            "server invalidated session"
        );
        match escalation {
            Escalation::Surface => ChannelError::SessionInvalidated { status },
            Escalation::ForceReconnect => {
                self.force_reconnect().await;
                ChannelError::SessionInvalidated { status }
            }
            Escalation::Unmount => ChannelError::Unrecoverable { status },
        }
    }
}
