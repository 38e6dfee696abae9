//! One transport leg to a server and the crediting state it owns.
//!
//! A [`Channel`] is shared by every task issuing requests over the leg. Its
//! [`CreditLedger`] sits behind one short-held mutex; the only suspension
//! point is admission waiting on `credit_available`, and that wait never
//! holds the lock.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use derive_more::{Display, From, Into};
use log::{debug, info};
use tokio::sync::Notify;

use crate::{
    command::CreditClass,
    config::{CreditConfig, CreditConfigError},
    credit::{CreditLedger, CreditSnapshot},
    message_id::MessageIdAllocator,
    reconnect::{Reconnect, TrialToken},
    request::{Request, RequestState},
};

/// Identifier of a channel, used in logs and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Into)]
#[display("channel-{_0}")]
pub struct ChannelId(u64);

/// Role of a channel within its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// The session's main channel.
    Primary,
    /// An additional channel bound to an existing session.
    Alternate,
}

/// Channel state bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, From, Into)]
pub struct ChannelFlags(u32);

impl ChannelFlags {
    pub const ALTERNATE_CHANNEL: Self = Self(0x1);
    pub const SHUTTING_DOWN: Self = Self(0x2);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }
}

impl fmt::Debug for ChannelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelFlags({:#x})", self.0)
    }
}

/// Crediting and sequencing state for one connection to a server.
pub struct Channel {
    id: ChannelId,
    config: CreditConfig,
    flags: AtomicU32,
    ledger: Mutex<CreditLedger>,
    credit_available: Notify,
    message_ids: MessageIdAllocator,
    reconnect: Arc<dyn Reconnect>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("flags", &self.flags())
            .field("credits", &self.credit_snapshot())
            .field("next_message_id", &self.message_ids.peek())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create a channel with an empty ledger.
    ///
    /// Crediting is not started: bootstrap commands may be sent at once, and
    /// everything else flows once [`Channel::start`] runs.
    ///
    /// # Errors
    ///
    /// Returns [`CreditConfigError`] if `config` fails validation.
    pub fn new(
        id: impl Into<ChannelId>,
        kind: ChannelKind,
        config: CreditConfig,
        reconnect: Arc<dyn Reconnect>,
    ) -> Result<Self, CreditConfigError> {
        config.validate()?;
        let flags = match kind {
            ChannelKind::Primary => ChannelFlags::default(),
            ChannelKind::Alternate => ChannelFlags::ALTERNATE_CHANNEL,
        };
        Ok(Self {
            id: id.into(),
            config,
            flags: AtomicU32::new(flags.into()),
            ledger: Mutex::new(CreditLedger::default()),
            credit_available: Notify::new(),
            message_ids: MessageIdAllocator::new(),
            reconnect,
        })
    }

    #[must_use]
    pub fn id(&self) -> ChannelId { self.id }

    #[must_use]
    pub fn config(&self) -> &CreditConfig { &self.config }

    #[must_use]
    pub fn flags(&self) -> ChannelFlags { ChannelFlags(self.flags.load(Ordering::Acquire)) }

    #[must_use]
    pub fn is_alternate(&self) -> bool { self.flags().contains(ChannelFlags::ALTERNATE_CHANNEL) }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool { self.flags().contains(ChannelFlags::SHUTTING_DOWN) }

    /// Id the next sequenced request will receive.
    #[must_use]
    pub fn next_message_id(&self) -> u64 { self.message_ids.peek() }

    /// Copy every ledger counter for diagnostics.
    #[must_use]
    pub fn credit_snapshot(&self) -> CreditSnapshot { self.lock_ledger().snapshot() }

    pub(crate) fn reconnector(&self) -> &Arc<dyn Reconnect> { &self.reconnect }

    /// Lock the ledger, recovering from a poisoned mutex.
    ///
    /// Ledger methods leave the counters consistent between statements, so
    /// a panic elsewhere cannot leave them half-updated.
    pub(crate) fn lock_ledger(&self) -> MutexGuard<'_, CreditLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn credit_available(&self) -> &Notify { &self.credit_available }

    /// Wake one registered waiter, if any.
    pub(crate) fn wake_one(&self, ledger: &mut CreditLedger) {
        if ledger.take_waiter() {
            self.credit_available.notify_one();
        }
    }

    pub(crate) fn publish_credits(&self, ledger: &CreditLedger) {
        crate::metrics::set_credits_granted(self.id.into(), ledger.credits_granted());
    }

    /// Open a reconnect trial; requests built with the token may bypass
    /// admission.
    pub fn begin_trial(&self) -> TrialToken {
        let token = self.lock_ledger().begin_trial();
        debug!("{} began reconnect {token}", self.id);
        token
    }

    pub fn end_trial(&self) { self.lock_ledger().end_trial(); }

    /// Reset crediting and sequencing for a re-established transport.
    ///
    /// Credits restart at `override_credits` (usually zero), message ids
    /// restart at zero and the send window empties. Crediting stays stopped
    /// until [`Channel::start`].
    pub fn reestablish(&self, override_credits: u16) {
        let mut ledger = self.lock_ledger();
        ledger.reestablish(override_credits);
        self.message_ids.reset();
        self.flags
            .fetch_and(!u32::from(ChannelFlags::SHUTTING_DOWN), Ordering::AcqRel);
        self.publish_credits(&ledger);
        info!("{} re-established with {override_credits} credits", self.id);
    }

    /// Mark the channel as shutting down and wake every waiter.
    ///
    /// Waiters re-check and fail with `Gone`. Admission enables its wake
    /// future before releasing the ledger lock, so `notify_waiters` reaches
    /// every task registered before the flag was seen.
    pub fn shut_down(&self) {
        self.flags
            .fetch_or(u32::from(ChannelFlags::SHUTTING_DOWN), Ordering::AcqRel);
        let woken = self.lock_ledger().take_all_waiters();
        self.credit_available.notify_waiters();
        debug!("{} shutting down, woke {woken} waiters", self.id);
    }

    /// Assign the request its message id and open its slot in the window.
    ///
    /// Cancel keeps the id of the request it targets and takes no slot.
    pub fn sequence(&self, request: &mut Request) -> u64 {
        if request.credit_class() != CreditClass::Cancel {
            let message_id = self.message_ids.allocate(request.credit_charge());
            request.set_message_id(message_id);
            self.lock_ledger().record_outstanding(message_id);
        }
        request.advance(RequestState::Sequenced);
        request.message_id()
    }

    /// Retire a sequenced request as `outcome` and move the window edge.
    ///
    /// A retired slot can reopen the window, so one waiter is woken to
    /// re-check.
    pub fn complete(&self, request: &mut Request, outcome: RequestState) {
        if request.credit_class() != CreditClass::Cancel {
            let mut ledger = self.lock_ledger();
            ledger.retire(request.message_id(), self.message_ids.peek());
            self.wake_one(&mut ledger);
        }
        request.advance(outcome);
    }

    /// Give back the charge of a request that was admitted but never sent.
    pub fn refund(&self, request: &mut Request) {
        let mut ledger = self.lock_ledger();
        if ledger.is_started() {
            ledger.refund(request.credit_charge());
            self.publish_credits(&ledger);
            self.wake_one(&mut ledger);
        }
        request.advance(RequestState::Failed);
    }
}
