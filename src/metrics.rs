//! Metric helpers for `smb2_flow`.
//!
//! This module defines metric names and thin wrappers around the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper compiles to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the counter tracking admissions that had to sleep for credit.
pub const CREDIT_WAITS: &str = "smb2_flow_credit_waits_total";
/// Name of the counter tracking admissions refused with `WouldBlock`.
pub const WOULD_BLOCK: &str = "smb2_flow_would_block_total";
/// Name of the counter tracking reconnects forced by the flow-control layer.
pub const FORCED_RECONNECTS: &str = "smb2_flow_forced_reconnects_total";
/// Name of the counter tracking malformed reply headers.
pub const DECODE_ERRORS: &str = "smb2_flow_decode_errors_total";
/// Name of the gauge mirroring a channel's granted credit.
pub const CREDITS_GRANTED: &str = "smb2_flow_credits_granted";

/// Record one blocking wait for credit.
pub fn inc_credit_waits() {
    #[cfg(feature = "metrics")]
    counter!(CREDIT_WAITS).increment(1);
}

/// Record an admission refused because the request could not block.
pub fn inc_would_block() {
    #[cfg(feature = "metrics")]
    counter!(WOULD_BLOCK).increment(1);
}

/// Record a forced reconnect.
pub fn inc_forced_reconnects() {
    #[cfg(feature = "metrics")]
    counter!(FORCED_RECONNECTS).increment(1);
}

/// Record a reply header that failed to decode.
pub fn inc_decode_errors() {
    #[cfg(feature = "metrics")]
    counter!(DECODE_ERRORS).increment(1);
}

/// Publish the granted credit of the channel labelled `channel`.
#[cfg_attr(
    not(feature = "metrics"),
    expect(unused_variables, reason = "arguments are only read when metrics are enabled")
)]
pub fn set_credits_granted(channel: u64, credits: i32) {
    #[cfg(feature = "metrics")]
    gauge!(CREDITS_GRANTED, "channel" => channel.to_string()).set(f64::from(credits));
}
