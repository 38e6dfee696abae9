//! Credit bookkeeping and admission control.
//!
//! The ledger holds the counters; admission implements the algorithms that
//! read and move them. Admission is written as methods on
//! [`Channel`](crate::channel::Channel) because it needs the channel's lock,
//! wake signal and reconnect hook together.

mod admission;
pub mod error;
pub mod ledger;

pub use error::AdmissionError;
pub use ledger::{CreditLedger, CreditSnapshot, allowed_len, credits_for_len};
