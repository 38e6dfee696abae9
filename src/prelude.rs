//! Convenience imports for driving a channel.
//!
//! # Examples
//!
//! ```rust,no_run
//! use smb2_flow::prelude::*;
//!
//! async fn read(
//!     dispatcher: &Dispatcher<impl Transport, impl SignatureVerifier>,
//! ) -> Result<Reply> {
//!     let mut request = Request::new(Command::READ).with_payload_len(1 << 20);
//!     dispatcher.send(&mut request).await
//! }
//! ```

pub use crate::{
    channel::{Channel, ChannelKind},
    command::Command,
    config::CreditConfig,
    dispatch::{Dispatcher, Reply},
    error::{ChannelError, Result},
    reconnect::Reconnect,
    request::Request,
    response::SignatureVerifier,
    share::ShareContext,
    transport::Transport,
};
