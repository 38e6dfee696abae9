//! Crediting tunables.
//!
//! [`CreditConfig`] collects the thresholds the admission algorithm works
//! against. Defaults suit a single client channel talking to a stock server;
//! tests shrink the wait tick to keep timeouts short.

use std::time::Duration;

use thiserror::Error;

/// Bytes of payload covered by one credit.
pub const CREDIT_UNIT_SIZE: usize = 64 * 1024;

const DEFAULT_LOW_WATER: u16 = 2;
const DEFAULT_MIN_CREDITS: u16 = 1;
const DEFAULT_MAX_CREDITS: u16 = 512;
const DEFAULT_REQUEST_AMOUNT: u16 = 64;
const DEFAULT_BOOTSTRAP_AMOUNT: u16 = 128;
const DEFAULT_WAIT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_WAIT_TICKS: u32 = 60;

/// Thresholds and timing used by credit admission.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use smb2_flow::config::CreditConfig;
///
/// let config = CreditConfig::default()
///     .max_credits(256)
///     .wait_tick(Duration::from_millis(100));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_credits_value(), 256);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditConfig {
    low_water: u16,
    min_credits: u16,
    max_credits: u16,
    request_amount: u16,
    bootstrap_amount: u16,
    wait_tick: Duration,
    wait_ticks: u32,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            low_water: DEFAULT_LOW_WATER,
            min_credits: DEFAULT_MIN_CREDITS,
            max_credits: DEFAULT_MAX_CREDITS,
            request_amount: DEFAULT_REQUEST_AMOUNT,
            bootstrap_amount: DEFAULT_BOOTSTRAP_AMOUNT,
            wait_tick: DEFAULT_WAIT_TICK,
            wait_ticks: DEFAULT_WAIT_TICKS,
        }
    }
}

impl CreditConfig {
    /// Credits kept in reserve when sizing multi-credit requests.
    #[must_use]
    pub fn low_water(mut self, credits: u16) -> Self {
        self.low_water = credits;
        self
    }

    /// Fewest granted credits that admit a request.
    #[must_use]
    pub fn min_credits(mut self, credits: u16) -> Self {
        self.min_credits = credits;
        self
    }

    /// Cap on the tracked high-water mark; below it requests ask for more.
    #[must_use]
    pub fn max_credits(mut self, credits: u16) -> Self {
        self.max_credits = credits;
        self
    }

    /// Credits asked for while the ledger sits below the cap.
    #[must_use]
    pub fn request_amount(mut self, credits: u16) -> Self {
        self.request_amount = credits;
        self
    }

    /// Credits asked for by Session-Setup and Tree-Connect.
    #[must_use]
    pub fn bootstrap_amount(mut self, credits: u16) -> Self {
        self.bootstrap_amount = credits;
        self
    }

    /// Length of one blocking wait before conditions are re-evaluated.
    #[must_use]
    pub fn wait_tick(mut self, tick: Duration) -> Self {
        self.wait_tick = tick;
        self
    }

    /// Ticks without progress before a reconnect is forced.
    #[must_use]
    pub fn wait_ticks(mut self, ticks: u32) -> Self {
        self.wait_ticks = ticks;
        self
    }

    #[must_use]
    pub const fn low_water_value(&self) -> u16 { self.low_water }

    #[must_use]
    pub const fn min_credits_value(&self) -> u16 { self.min_credits }

    #[must_use]
    pub const fn max_credits_value(&self) -> u16 { self.max_credits }

    #[must_use]
    pub const fn request_amount_value(&self) -> u16 { self.request_amount }

    #[must_use]
    pub const fn bootstrap_amount_value(&self) -> u16 { self.bootstrap_amount }

    #[must_use]
    pub const fn wait_tick_value(&self) -> Duration { self.wait_tick }

    #[must_use]
    pub const fn wait_ticks_value(&self) -> u32 { self.wait_ticks }

    /// Check the thresholds are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns [`CreditConfigError`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), CreditConfigError> {
        if self.min_credits == 0 {
            return Err(CreditConfigError::ZeroMinimum);
        }
        if self.low_water >= self.max_credits {
            return Err(CreditConfigError::LowWaterAboveCap {
                low_water: self.low_water,
                max_credits: self.max_credits,
            });
        }
        if self.request_amount == 0 {
            return Err(CreditConfigError::ZeroRequestAmount);
        }
        if self.wait_ticks == 0 || self.wait_tick.is_zero() {
            return Err(CreditConfigError::ZeroWait);
        }
        Ok(())
    }
}

/// Errors returned by [`CreditConfig::validate`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CreditConfigError {
    #[error("min_credits must be at least 1")]
    ZeroMinimum,
    #[error("low water {low_water} must be below the credit cap {max_credits}")]
    LowWaterAboveCap { low_water: u16, max_credits: u16 },
    #[error("request_amount must be at least 1")]
    ZeroRequestAmount,
    #[error("wait tick and tick count must both be non-zero")]
    ZeroWait,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CreditConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.low_water_value(), 2);
        assert_eq!(config.wait_ticks_value(), 60);
        assert_eq!(config.wait_tick_value(), Duration::from_secs(1));
    }

    #[rstest]
    #[case::zero_min(CreditConfig::default().min_credits(0), CreditConfigError::ZeroMinimum)]
    #[case::low_water(
        CreditConfig::default().low_water(8).max_credits(8),
        CreditConfigError::LowWaterAboveCap { low_water: 8, max_credits: 8 }
    )]
    #[case::request(CreditConfig::default().request_amount(0), CreditConfigError::ZeroRequestAmount)]
    #[case::ticks(CreditConfig::default().wait_ticks(0), CreditConfigError::ZeroWait)]
    #[case::tick(CreditConfig::default().wait_tick(Duration::ZERO), CreditConfigError::ZeroWait)]
    fn invalid_configs_are_rejected(
        #[case] config: CreditConfig,
        #[case] expected: CreditConfigError,
    ) {
        assert_eq!(config.validate(), Err(expected));
    }
}
