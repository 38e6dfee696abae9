//! Per-channel credit bookkeeping.
//!
//! [`CreditLedger`] is plain data guarded by the channel's ledger mutex. Its
//! methods are the check-then-act steps of admission and reclaim; callers
//! run them with the lock held so no decision is taken on a stale read.

use std::collections::BTreeSet;

use crate::{config::CREDIT_UNIT_SIZE, reconnect::TrialToken};

/// Mutable crediting state of one channel.
#[derive(Debug, Default)]
pub struct CreditLedger {
    credits_granted: i32,
    credits_max: u32,
    credits_ss_granted: u32,
    credits_wait: u32,
    oldest_message_id: u64,
    req_pending: u32,
    outstanding: BTreeSet<u64>,
    started: bool,
    trial: Option<TrialToken>,
    trial_seq: u64,
}

/// Point-in-time copy of a [`CreditLedger`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditSnapshot {
    pub credits_granted: i32,
    pub credits_max: u32,
    pub credits_ss_granted: u32,
    pub credits_wait: u32,
    pub oldest_message_id: u64,
    pub req_pending: u32,
    pub started: bool,
    pub trial: Option<TrialToken>,
}

/// Number of credits needed to carry `len` payload bytes.
///
/// Zero-length requests still consume one credit.
///
/// # Examples
///
/// ```
/// use smb2_flow::credit::credits_for_len;
///
/// assert_eq!(credits_for_len(0), 1);
/// assert_eq!(credits_for_len(65_536), 1);
/// assert_eq!(credits_for_len(65_537), 2);
/// ```
#[must_use]
pub fn credits_for_len(len: usize) -> u16 {
    let credits = len.div_ceil(CREDIT_UNIT_SIZE).max(1);
    u16::try_from(credits).unwrap_or(u16::MAX)
}

/// Clamp `requested_len` to what `granted` credits can safely carry.
///
/// Lengths within one credit pass through. Larger lengths are cut to whole
/// credit units, and to no more than `granted - low_water` units; at or below
/// the low-water mark they degrade to a single credit.
#[must_use]
pub fn allowed_len(granted: i32, requested_len: usize, low_water: u16) -> usize {
    if requested_len <= CREDIT_UNIT_SIZE {
        return requested_len;
    }
    let granted = i64::from(granted);
    let low_water = i64::from(low_water);
    if granted <= low_water {
        return CREDIT_UNIT_SIZE;
    }
    let whole_units = requested_len / CREDIT_UNIT_SIZE;
    let needed = i64::from(credits_for_len(requested_len));
    let units = if needed + low_water > granted {
        let spare = usize::try_from(granted - low_water).unwrap_or(1);
        whole_units.min(spare)
    } else {
        whole_units
    };
    units.max(1) * CREDIT_UNIT_SIZE
}

impl CreditLedger {
    #[must_use]
    pub fn credits_granted(&self) -> i32 { self.credits_granted }

    #[must_use]
    pub fn credits_wait(&self) -> u32 { self.credits_wait }

    #[must_use]
    pub fn req_pending(&self) -> u32 { self.req_pending }

    #[must_use]
    pub fn is_started(&self) -> bool { self.started }

    #[must_use]
    pub fn trial(&self) -> Option<TrialToken> { self.trial }

    #[must_use]
    pub fn snapshot(&self) -> CreditSnapshot {
        CreditSnapshot {
            credits_granted: self.credits_granted,
            credits_max: self.credits_max,
            credits_ss_granted: self.credits_ss_granted,
            credits_wait: self.credits_wait,
            oldest_message_id: self.oldest_message_id,
            req_pending: self.req_pending,
            started: self.started,
            trial: self.trial,
        }
    }

    /// Report whether the outstanding message ids fit inside granted credit.
    ///
    /// The distance is computed with wrapping subtraction so a counter that
    /// has wrapped still yields the right window width.
    #[must_use]
    pub fn window_open(&self, next_message_id: u64) -> bool {
        let granted = u64::try_from(self.credits_granted).unwrap_or(0);
        self.req_pending == 0 || next_message_id.wrapping_sub(self.oldest_message_id) <= granted
    }

    /// Report whether a request needing `needed` credits may proceed now.
    #[must_use]
    pub fn admits(&self, needed: u16, min_credits: u16, next_message_id: u64) -> bool {
        let floor = i32::from(min_credits.max(needed));
        self.credits_granted >= floor && self.window_open(next_message_id)
    }

    /// Subtract a request's charge from granted credit.
    pub fn charge(&mut self, credits: u16) { self.credits_granted -= i32::from(credits); }

    /// Return a charge that was taken for a request that never went out.
    pub fn refund(&mut self, credits: u16) { self.credits_granted += i32::from(credits); }

    /// Add server-granted credit and raise the high-water mark.
    pub fn grant(&mut self, credits: u16, max_credits: u16) {
        self.credits_granted = self.credits_granted.saturating_add(i32::from(credits));
        let capped = self.credits_granted.clamp(0, i32::from(max_credits));
        self.credits_max = self.credits_max.max(u32::try_from(capped).unwrap_or(0));
    }

    /// Hold bootstrap credit back until crediting starts.
    pub fn grant_bootstrap(&mut self, credits: u16) {
        self.credits_ss_granted = self.credits_ss_granted.saturating_add(u32::from(credits));
    }

    /// Forget every credit counter and return to the bootstrap phase, as a
    /// fresh negotiate requires.
    pub fn clear_credits(&mut self) {
        self.credits_granted = 0;
        self.credits_ss_granted = 0;
        self.credits_max = 0;
        self.oldest_message_id = 0;
        self.req_pending = 0;
        self.outstanding.clear();
        self.started = false;
    }

    /// Reset the ledger for a re-established transport.
    ///
    /// Waiter registrations survive: threads asleep in admission still
    /// deregister themselves.
    pub fn reestablish(&mut self, override_credits: u16) {
        self.credits_granted = i32::from(override_credits);
        self.credits_max = u32::from(override_credits);
        self.credits_ss_granted = 0;
        self.oldest_message_id = 0;
        self.req_pending = 0;
        self.outstanding.clear();
        self.started = false;
    }

    /// Begin normal crediting, consuming bootstrap credit unless overridden.
    pub fn start(&mut self, override_credits: u16) {
        let granted = if override_credits == 0 {
            std::mem::take(&mut self.credits_ss_granted)
        } else {
            self.credits_ss_granted = 0;
            u32::from(override_credits)
        };
        self.credits_granted = i32::try_from(granted).unwrap_or(i32::MAX);
        self.credits_max = granted;
        self.req_pending = 0;
        self.oldest_message_id = 0;
        self.outstanding.clear();
        self.started = true;
    }

    pub fn register_waiter(&mut self) { self.credits_wait += 1; }

    /// Drop one waiter registration after a timed-out wait.
    pub fn deregister_waiter(&mut self) { self.credits_wait = self.credits_wait.saturating_sub(1); }

    /// Claim one registered waiter for waking. Returns `false` when none wait.
    pub fn take_waiter(&mut self) -> bool {
        if self.credits_wait == 0 {
            return false;
        }
        self.credits_wait -= 1;
        true
    }

    /// Claim every registered waiter, returning how many there were.
    pub fn take_all_waiters(&mut self) -> u32 { std::mem::take(&mut self.credits_wait) }

    /// Track a sequenced request as outstanding.
    pub fn record_outstanding(&mut self, message_id: u64) {
        if self.outstanding.insert(message_id) {
            self.req_pending += 1;
        }
        if let Some(&oldest) = self.outstanding.first() {
            self.oldest_message_id = oldest;
        }
    }

    /// Retire a completed request and advance the window's trailing edge.
    ///
    /// With nothing outstanding the edge moves to `next_message_id`.
    pub fn retire(&mut self, message_id: u64, next_message_id: u64) {
        if self.outstanding.remove(&message_id) {
            self.req_pending = self.req_pending.saturating_sub(1);
        }
        self.oldest_message_id = self.outstanding.first().copied().unwrap_or(next_message_id);
    }

    /// Open a new reconnect trial and return its token.
    pub fn begin_trial(&mut self) -> TrialToken {
        self.trial_seq += 1;
        let token = TrialToken::new(self.trial_seq);
        self.trial = Some(token);
        token
    }

    pub fn end_trial(&mut self) { self.trial = None; }

    /// Report whether `token` names the trial currently in flight.
    #[must_use]
    pub fn in_trial(&self, token: Option<TrialToken>) -> bool {
        token.is_some() && token == self.trial
    }
}
