//! Utilities for exercising an [`smb2_flow`] channel without a server.
//!
//! [`ScriptedTransport`] stands in for the socket layer: replies are either
//! queued by hand or produced by a [`Responder`] that answers each frame as
//! it is sent.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use smb2_flow::{command::Command, dispatch::Dispatcher, request::Request};
//! use smb2_flow_testing::{Responder, ScriptedTransport, accept_all, started_channel};
//!
//! # async fn example() {
//! let transport = Arc::new(ScriptedTransport::responding(Responder::granting(8)));
//! let dispatcher = Dispatcher::new(Arc::new(started_channel(4)), transport, accept_all);
//! let reply = dispatcher.send(&mut Request::new(Command::ECHO)).await.unwrap();
//! assert_eq!(reply.header.credits, 8);
//! # }
//! ```

pub mod logging;
pub mod metrics;
pub mod replies;
pub mod transport;

pub use logging::{LoggerHandle, logger};
pub use metrics::{MetricsCapture, counter_value};
pub use replies::{Responder, encode_reply, grant, reply_to};
pub use smb2_flow::test_helpers::{
    RecordingReconnect,
    StaticShare,
    alternate,
    channel_with,
    primary,
    started_channel,
};
pub use transport::ScriptedTransport;

/// Signature verifier that accepts every reply.
#[must_use]
pub fn accept_all(_: &smb2_flow::header::Smb2Header, _: &[u8]) -> bool { true }

/// Signature verifier that rejects every reply.
#[must_use]
pub fn reject_all(_: &smb2_flow::header::Smb2Header, _: &[u8]) -> bool { false }
