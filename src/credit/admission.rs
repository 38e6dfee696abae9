//! Blocking credit admission, reply reclaim and crediting start.

use std::pin::{Pin, pin};

use log::{debug, info};
use tokio::{sync::futures::Notified, time::timeout};

use super::{AdmissionError, allowed_len, credits_for_len};
use crate::{
    channel::Channel,
    command::CreditClass,
    request::{Request, RequestState},
};

/// Outcome of one locked evaluation in the admission loop.
enum Step {
    Admitted { len: Option<usize> },
    WouldBlock,
    Gone,
    Wait,
}

/// A waiter registration withdrawn when the wait ends without a wake.
///
/// Dropping the admission future mid-wait drops this guard, so the ledger
/// only ever counts tasks that are still asleep.
struct WaiterRegistration<'a> {
    channel: &'a Channel,
    armed: bool,
}

impl<'a> WaiterRegistration<'a> {
    fn new(channel: &'a Channel) -> Self {
        Self {
            channel,
            armed: true,
        }
    }

    /// The waker already withdrew this registration.
    fn claimed(mut self) { self.armed = false; }
}

impl Drop for WaiterRegistration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.channel.lock_ledger().deregister_waiter();
        }
    }
}

impl Channel {
    /// Clamp `requested_len` to what currently granted credit can carry.
    ///
    /// Lengths within one credit are returned unchanged. The result is never
    /// zero for a non-zero input and never exceeds it.
    #[must_use]
    pub fn credit_check(&self, requested_len: usize) -> usize {
        let granted = self.lock_ledger().credits_granted();
        allowed_len(granted, requested_len, self.config().low_water_value())
    }

    /// Admit `request`, charging its credit and sizing its credit request.
    ///
    /// When `requested_len` is given it is clamped to available credit and
    /// the charge is derived from the clamped length, which is returned.
    ///
    /// Waits in ticks of [`CreditConfig::wait_tick`] while credit is short.
    /// After [`CreditConfig::wait_ticks`] ticks without credit a reconnect is
    /// forced and waiting continues; a stall never fails the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::WouldBlock`] when credit is short and the
    /// request may not wait, and [`AdmissionError::Gone`] when the share or
    /// channel is torn down first. In both cases nothing is charged.
    ///
    /// [`CreditConfig::wait_tick`]: crate::config::CreditConfig::wait_tick
    /// [`CreditConfig::wait_ticks`]: crate::config::CreditConfig::wait_ticks
    pub async fn decrement(
        &self,
        request: &mut Request,
        requested_len: Option<usize>,
    ) -> Result<Option<usize>, AdmissionError> {
        let class = request.credit_class();
        match class {
            CreditClass::Negotiate => {
                let mut ledger = self.lock_ledger();
                ledger.clear_credits();
                self.publish_credits(&ledger);
                drop(ledger);
                request.set_credit_charge(0);
                request.set_credits_requested(0);
                request.advance(RequestState::CreditPending);
                return Ok(requested_len);
            }
            CreditClass::Cancel => {
                request.set_credit_charge(0);
                request.set_credits_requested(0);
                request.advance(RequestState::CreditPending);
                return Ok(None);
            }
            CreditClass::SessionSetup | CreditClass::TreeConnect => {
                request.set_credits_requested(self.config().bootstrap_amount_value());
            }
            _ => {}
        }

        if matches!(class, CreditClass::TreeConnect | CreditClass::Logoff)
            && self.lock_ledger().in_trial(request.trial())
        {
            debug!("{} {} bypasses admission in trial", self.id(), request.command());
            request.advance(RequestState::CreditPending);
            return Ok(requested_len);
        }

        let mut ticks = 0u32;
        let mut waited = false;
        loop {
            let woken = {
                let mut notified = pin!(self.credit_available().notified());
                match self.try_admit(request, requested_len, notified.as_mut()) {
                    Step::Admitted { len } => {
                        request.advance(RequestState::CreditPending);
                        return Ok(len);
                    }
                    Step::WouldBlock => {
                        crate::metrics::inc_would_block();
                        debug!("{} {} would block for credit", self.id(), request.command());
                        return Err(AdmissionError::WouldBlock);
                    }
                    Step::Gone => {
                        request.advance(RequestState::Failed);
                        return Err(AdmissionError::Gone);
                    }
                    Step::Wait => {}
                }
                let registration = WaiterRegistration::new(self);

                if !waited {
                    waited = true;
                    crate::metrics::inc_credit_waits();
                    debug!("{} {} waiting for credit", self.id(), request.command());
                }
                let woken = timeout(self.config().wait_tick_value(), notified)
                    .await
                    .is_ok();
                if woken {
                    registration.claimed();
                }
                woken
            };
            if woken {
                continue;
            }

            ticks += 1;
            if ticks >= self.config().wait_ticks_value() {
                ticks = 0;
                self.force_reconnect().await;
            }
        }
    }

    /// Evaluate admission once with the lock held.
    ///
    /// On success the charge is already subtracted. On `Wait` this task is
    /// registered as a waiter and `notified` is enabled before the lock is
    /// released, so no wake sent after registration can be missed.
    fn try_admit(
        &self,
        request: &mut Request,
        requested_len: Option<usize>,
        notified: Pin<&mut Notified<'_>>,
    ) -> Step {
        let config = *self.config();
        let mut ledger = self.lock_ledger();

        if !ledger.is_started() {
            if let Some(len) = requested_len {
                request.set_credit_charge(credits_for_len(len));
                request.set_payload_len(len);
            }
            self.size_credit_request(request, ledger.credits_granted());
            return Step::Admitted { len: requested_len };
        }

        let needed = if requested_len.is_some() { 1 } else { request.credit_charge() };
        if ledger.admits(needed, config.min_credits_value(), self.next_message_id()) {
            let len = requested_len
                .map(|len| allowed_len(ledger.credits_granted(), len, config.low_water_value()));
            if let Some(len) = len {
                request.set_credit_charge(credits_for_len(len));
                request.set_payload_len(len);
            }
            ledger.charge(request.credit_charge());
            self.size_credit_request(request, ledger.credits_granted());
            self.publish_credits(&ledger);
            return Step::Admitted { len };
        }

        if request.forbids_blocking() {
            return Step::WouldBlock;
        }
        if self.is_shutting_down() || request.share_going_away() {
            return Step::Gone;
        }
        notified.enable();
        ledger.register_waiter();
        Step::Wait
    }

    /// Choose how many credits the request asks the server for.
    ///
    /// Bootstrap commands keep the bonus set earlier. Below the cap a request
    /// asks for the configured top-up; at the cap it asks to replace its own
    /// charge.
    fn size_credit_request(&self, request: &mut Request, granted: i32) {
        if matches!(
            request.credit_class(),
            CreditClass::SessionSetup | CreditClass::TreeConnect
        ) {
            return;
        }
        let config = self.config();
        if granted < i32::from(config.max_credits_value()) {
            request.set_credits_requested(config.request_amount_value());
        } else {
            let keep = request.credits_requested().max(request.credit_charge());
            request.set_credits_requested(keep);
        }
    }

    /// Apply the credits granted by `request`'s reply.
    ///
    /// A zero grant changes nothing and wakes nobody.
    pub fn increment(&self, request: &Request) {
        let credits = request.reply_credits();
        if credits == 0 {
            return;
        }
        let mut ledger = self.lock_ledger();
        match request.credit_class() {
            CreditClass::Negotiate | CreditClass::Logoff => {}
            CreditClass::SessionSetup => ledger.grant_bootstrap(credits),
            CreditClass::TreeConnect if ledger.in_trial(request.trial()) => {
                ledger.grant_bootstrap(credits);
            }
            _ => {
                ledger.grant(credits, self.config().max_credits_value());
                self.publish_credits(&ledger);
                self.wake_one(&mut ledger);
            }
        }
    }

    /// Begin normal crediting.
    ///
    /// With `override_credits == 0` the credit accumulated by bootstrap
    /// replies becomes usable; otherwise exactly `override_credits` are.
    /// Empties the send window and wakes one waiter.
    pub fn start(&self, override_credits: u16) {
        let mut ledger = self.lock_ledger();
        ledger.start(override_credits);
        self.publish_credits(&ledger);
        self.wake_one(&mut ledger);
        info!(
            "{} crediting started with {} credits",
            self.id(),
            ledger.credits_granted()
        );
    }
}
