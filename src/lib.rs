//! Public API for the `smb2_flow` library.
//!
//! This crate implements the credit-based flow control and request
//! sequencing of an SMB 2/3 client channel: credit admission with bounded
//! blocking waits, message id allocation, the 64-byte wire header, compound
//! chaining, early credit extraction from replies, and reconnect escalation.
//! Transport, session management and signing are supplied by the caller
//! through the [`transport::Transport`], [`share::ShareContext`],
//! [`reconnect::Reconnect`] and [`response::SignatureVerifier`] traits.

pub mod byte_order;
pub mod channel;
pub mod command;
pub mod compound;
pub mod config;
pub mod credit;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod message_id;
pub mod metrics;
pub mod prelude;
pub mod reconnect;
pub mod request;
pub mod response;
pub mod share;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod transport;

pub use channel::{Channel, ChannelId, ChannelKind};
pub use config::{CREDIT_UNIT_SIZE, CreditConfig};
pub use credit::{AdmissionError, CreditSnapshot};
pub use error::{ChannelError, Result};
pub use metrics::{CREDIT_WAITS, CREDITS_GRANTED, DECODE_ERRORS, FORCED_RECONNECTS, WOULD_BLOCK};
