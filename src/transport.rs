//! Interface to the byte transport beneath a channel.
//!
//! Socket I/O, NetBIOS framing and reply demultiplexing live behind this
//! trait. The flow-control layer hands over fully encoded buffers and asks
//! for reply bytes by message id.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;

/// Moves encoded SMB2 messages to and from the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded request or compound chain.
    async fn send(&self, frame: Bytes) -> io::Result<()>;

    /// Wait for the reply addressed to `message_id`.
    ///
    /// For a compound chain the transport delivers the whole chained reply
    /// under the first member's id.
    async fn recv(&self, message_id: u64) -> io::Result<Bytes>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, frame: Bytes) -> io::Result<()> { (**self).send(frame).await }

    async fn recv(&self, message_id: u64) -> io::Result<Bytes> { (**self).recv(message_id).await }
}
