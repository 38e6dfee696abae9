#![cfg(any(test, feature = "test-helpers"))]
//! Collaborator doubles shared by unit and integration tests.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::{
    channel::{Channel, ChannelKind},
    config::CreditConfig,
    reconnect::Reconnect,
    share::ShareContext,
};

/// Reconnect double that counts calls and can restore credit.
#[derive(Debug, Default)]
pub struct RecordingReconnect {
    calls: AtomicUsize,
    restore: Option<u16>,
}

impl RecordingReconnect {
    /// Re-establish the channel and start it with `credits` on every call.
    #[must_use]
    pub fn restoring(credits: u16) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            restore: Some(credits),
        }
    }

    /// Number of forced reconnects seen so far.
    #[must_use]
    pub fn count(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl Reconnect for RecordingReconnect {
    async fn force_reconnect(&self, channel: &Channel) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(credits) = self.restore {
            channel.reestablish(0);
            channel.start(credits);
        }
    }
}

/// Share double with fixed identifiers and a toggleable teardown flag.
#[derive(Debug)]
pub struct StaticShare {
    session_id: u64,
    tree_id: u32,
    going_away: AtomicBool,
    encrypted: bool,
    signing_required: bool,
}

impl Default for StaticShare {
    fn default() -> Self { Self::new(0x1000_0000_0000_0041, 5) }
}

impl StaticShare {
    #[must_use]
    pub fn new(session_id: u64, tree_id: u32) -> Self {
        Self {
            session_id,
            tree_id,
            going_away: AtomicBool::new(false),
            encrypted: false,
            signing_required: false,
        }
    }

    #[must_use]
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    #[must_use]
    pub fn signing_required(mut self) -> Self {
        self.signing_required = true;
        self
    }

    pub fn set_going_away(&self, going_away: bool) {
        self.going_away.store(going_away, Ordering::SeqCst);
    }
}

impl ShareContext for StaticShare {
    fn session_id(&self) -> u64 { self.session_id }

    fn tree_id(&self) -> u32 { self.tree_id }

    fn going_away(&self) -> bool { self.going_away.load(Ordering::SeqCst) }

    fn encrypted(&self) -> bool { self.encrypted }

    fn signing_required(&self) -> bool { self.signing_required }
}

#[must_use]
pub fn primary() -> ChannelKind { ChannelKind::Primary }

#[must_use]
pub fn alternate() -> ChannelKind { ChannelKind::Alternate }

/// Build a channel with default tunables.
///
/// # Panics
///
/// Never; the default configuration always validates.
#[must_use]
pub fn channel_with(kind: ChannelKind, reconnect: Arc<dyn Reconnect>) -> Channel {
    Channel::new(1u64, kind, CreditConfig::default(), reconnect)
        .expect("default config is valid")
}

/// Build a primary channel whose crediting has started with `credits`.
#[must_use]
pub fn started_channel(credits: u16) -> Channel {
    let channel = channel_with(primary(), Arc::new(RecordingReconnect::default()));
    channel.start(credits);
    channel
}
