//! The send pipeline: admission, sequencing, encoding, transport and reply
//! handling for single requests and compound chains.
//!
//! A [`Dispatcher`] ties one [`Channel`] to its [`Transport`] and the
//! session's [`SignatureVerifier`]. Every path that fails after a request was
//! sequenced retires it from the send window so later requests are not
//! starved.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};

use crate::{
    channel::Channel,
    command::Command,
    compound::{CompoundReplyCursor, encode_chain},
    error::{ChannelError, Result},
    header::{HEADER_LEN, HeaderError, Smb2Header},
    request::{Request, RequestState},
    response::{
        ReplyDisposition,
        SignatureCheck,
        SignatureVerifier,
        extract_credits,
        parse_reply,
        signature_check,
    },
    transport::Transport,
};

/// Final reply to one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub header: Smb2Header,
    /// Bytes after the header; for a chained member this includes padding.
    pub body: Bytes,
}

/// Sends requests over one channel.
pub struct Dispatcher<T, V> {
    channel: Arc<Channel>,
    transport: T,
    verifier: V,
}

impl<T, V> Dispatcher<T, V>
where
    T: Transport,
    V: SignatureVerifier,
{
    #[must_use]
    pub fn new(channel: Arc<Channel>, transport: T, verifier: V) -> Self {
        Self {
            channel,
            transport,
            verifier,
        }
    }

    #[must_use]
    pub fn channel(&self) -> &Arc<Channel> { &self.channel }

    #[must_use]
    pub fn transport(&self) -> &T { &self.transport }

    /// Send one request and wait for its final reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Admission`] if the request was not admitted,
    /// [`ChannelError::Io`] on transport failure, [`ChannelError::Decode`]
    /// for a malformed or mismatched reply, [`ChannelError::SignatureInvalid`]
    /// when verification fails, and the escalated session error when the
    /// server invalidated the session.
    pub async fn send(&self, request: &mut Request) -> Result<Reply> {
        let len = request.payload_len();
        self.channel.decrement(request, len).await?;
        self.channel.sequence(request);

        let mut frame = BytesMut::new();
        request.encode(&mut frame);
        if let Err(error) = self.transport.send(frame.freeze()).await {
            self.channel.complete(request, RequestState::Failed);
            return Err(error.into());
        }
        request.advance(RequestState::Sent);
        request.advance(RequestState::AwaitingReply);
        self.await_reply(request).await
    }

    /// Send `requests` as one compound chain and collect each final reply.
    ///
    /// Members are admitted in order. If one is refused, the charges already
    /// taken for earlier members are returned and nothing is sent.
    ///
    /// # Errors
    ///
    /// As for [`Dispatcher::send`]. The first failing member ends the call and
    /// every member still outstanding is retired as failed.
    pub async fn send_compound(&self, requests: &mut [Request]) -> Result<Vec<Reply>> {
        for index in 0..requests.len() {
            let len = requests[index].payload_len();
            if let Err(error) = self.channel.decrement(&mut requests[index], len).await {
                for admitted in &mut requests[..index] {
                    self.channel.refund(admitted);
                }
                return Err(error.into());
            }
        }
        for request in requests.iter_mut() {
            self.channel.sequence(request);
        }

        let frame = encode_chain(requests);
        if let Err(error) = self.transport.send(frame).await {
            self.fail_outstanding(requests);
            return Err(error.into());
        }
        for request in requests.iter_mut() {
            request.advance(RequestState::Sent);
            request.advance(RequestState::AwaitingReply);
        }

        match self.collect_chain(requests).await {
            Ok(replies) => Ok(replies),
            Err(error) => {
                self.fail_outstanding(requests);
                Err(error)
            }
        }
    }

    /// Ask the server to cancel `target`, which must be awaiting its reply.
    ///
    /// Cancel is never charged, takes no new message id and gets no reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the transport refuses the message.
    pub async fn cancel(&self, target: &Request) -> Result<()> {
        let mut cancel =
            Request::new(Command::CANCEL).cancelling(target.message_id(), target.async_id());
        if let Some(share) = target.share() {
            cancel = cancel.with_share(Arc::clone(share));
        }
        self.channel.decrement(&mut cancel, None).await?;
        self.channel.sequence(&mut cancel);
        let mut frame = BytesMut::new();
        cancel.encode(&mut frame);
        self.transport.send(frame.freeze()).await?;
        debug!("{} cancelled message {}", self.channel.id(), target.message_id());
        Ok(())
    }

    async fn collect_chain(&self, requests: &mut [Request]) -> Result<Vec<Reply>> {
        let Some(first) = requests.first() else {
            return Ok(Vec::new());
        };
        let bytes = self.transport.recv(first.message_id()).await?;
        let mut replies = Vec::with_capacity(requests.len());
        let mut members = CompoundReplyCursor::new(&bytes);
        for request in requests.iter_mut() {
            let member = match members.next() {
                Some(member) => member.inspect_err(|_| crate::metrics::inc_decode_errors())?,
                None => {
                    return Err(HeaderError::Truncated {
                        have: 0,
                        need: HEADER_LEN,
                    }
                    .into());
                }
            };
            let frame = bytes.slice_ref(member.frame);
            let reply = match self.finish(request, &frame).await? {
                Some(reply) => reply,
                None => self.await_reply(request).await?,
            };
            replies.push(reply);
        }
        Ok(replies)
    }

    /// Receive replies for `request` until the final one arrives.
    async fn await_reply(&self, request: &mut Request) -> Result<Reply> {
        loop {
            let bytes = match self.transport.recv(request.message_id()).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    self.channel.complete(request, RequestState::Failed);
                    return Err(error.into());
                }
            };
            if let Err(error) = extract_credits(&self.channel, request, &bytes) {
                crate::metrics::inc_decode_errors();
                self.channel.complete(request, RequestState::Failed);
                return Err(error.into());
            }
            if let Some(reply) = self.finish(request, &bytes).await? {
                return Ok(reply);
            }
        }
    }

    /// Parse one reply frame for `request`.
    ///
    /// Returns `None` when more replies are expected. Completes the request
    /// on a final reply or any failure.
    async fn finish(&self, request: &mut Request, frame: &Bytes) -> Result<Option<Reply>> {
        let mut cursor = &frame[..];
        let header = match parse_reply(&self.channel, request, &mut cursor) {
            Ok(ReplyDisposition::Final(header)) => header,
            Ok(ReplyDisposition::Interim(_) | ReplyDisposition::Unsolicited(_)) => return Ok(None),
            Err(error) => {
                crate::metrics::inc_decode_errors();
                warn!(
                    "{} dropped reply to {}: {error}",
                    self.channel.id(),
                    request.message_id()
                );
                self.channel.complete(request, RequestState::Failed);
                return Err(error.into());
            }
        };

        if signature_check(request, &header) == SignatureCheck::Verify
            && !self.verifier.verify(&header, frame)
        {
            self.channel.complete(request, RequestState::Failed);
            return Err(ChannelError::SignatureInvalid {
                message_id: header.message_id,
            });
        }

        if header.status.invalidates_session() {
            self.channel.complete(request, RequestState::Failed);
            return Err(self.channel.escalate(request, header.status).await);
        }

        self.channel.complete(request, RequestState::Completed);
        Ok(Some(Reply {
            header,
            body: frame.slice(HEADER_LEN..),
        }))
    }

    fn fail_outstanding(&self, requests: &mut [Request]) {
        for request in requests.iter_mut().filter(|r| !r.state().is_terminal()) {
            self.channel.complete(request, RequestState::Failed);
        }
    }
}
