//! A single SMB2 request as seen by the crediting engine.
//!
//! The command payload is opaque here; `Request` carries only the header
//! fields crediting and sequencing decide, plus the encoded body bytes the
//! caller supplied. A request is owned by whoever built it until it is handed
//! to the transport.

use std::{fmt, sync::Arc};

use bytes::{BufMut, Bytes, BytesMut};
use derive_more::{From, Into};

use crate::{
    command::{Command, CreditClass},
    header::{CLIENT_PROCESS_ID, HeaderFlags, HeaderId, HeaderSlots, NtStatus, Smb2Header},
    reconnect::TrialToken,
    share::ShareContext,
};

/// Lifecycle of a request with respect to crediting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Being built; may return here after `WouldBlock`.
    Building,
    /// Admitted and charged, not yet given a message id.
    CreditPending,
    /// Holds a message id and counts against the send window.
    Sequenced,
    /// Handed to the transport.
    Sent,
    /// Sent and waiting for its final reply.
    AwaitingReply,
    Completed,
    Failed,
}

impl RequestState {
    /// Report whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Building, Self::CreditPending | Self::Failed)
                | (Self::CreditPending, Self::Sequenced | Self::Failed)
                | (Self::Sequenced, Self::Sent | Self::Failed)
                | (Self::Sent, Self::AwaitingReply | Self::Failed)
                | (Self::AwaitingReply, Self::Completed | Self::Failed)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Failed) }
}

/// Client-side request flags.
///
/// Only `ASYNC`, `RELATED_OPERATIONS` and `SIGNED` reach the wire; `NO_BLOCK`
/// and `COMPOUND` steer local crediting.
#[derive(Clone, Copy, Default, PartialEq, Eq, From, Into)]
pub struct RequestFlags(u32);

impl RequestFlags {
    pub const ASYNC: Self = Self(0x01);
    pub const RELATED_OPERATIONS: Self = Self(0x02);
    pub const SIGNED: Self = Self(0x04);
    /// The request must fail rather than wait for credit.
    pub const NO_BLOCK: Self = Self(0x08);
    /// The request travels inside a compound chain.
    pub const COMPOUND: Self = Self(0x10);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    pub fn insert(&mut self, other: Self) { self.0 |= other.0; }
}

impl fmt::Debug for RequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestFlags({:#04x})", self.0)
    }
}

/// One SMB2 command instance, possibly a member of a compound chain.
pub struct Request {
    command: Command,
    credit_charge: u16,
    credits_requested: u16,
    message_id: u64,
    async_id: Option<u64>,
    session_id: u64,
    tree_id: u32,
    flags: RequestFlags,
    next_command_offset: u32,
    state: RequestState,
    share: Option<Arc<dyn ShareContext>>,
    trial: Option<TrialToken>,
    body: Bytes,
    payload_len: Option<usize>,
    reply_credits: u16,
    reply_status: Option<NtStatus>,
    pre_parsed: bool,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("command", &self.command)
            .field("credit_charge", &self.credit_charge)
            .field("credits_requested", &self.credits_requested)
            .field("message_id", &self.message_id)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("trial", &self.trial)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Start building a request for `command`.
    ///
    /// # Examples
    ///
    /// ```
    /// use smb2_flow::{command::Command, request::{Request, RequestState}};
    ///
    /// let request = Request::new(Command::READ).with_payload_len(200_000);
    /// assert_eq!(request.state(), RequestState::Building);
    /// assert_eq!(request.credit_charge(), 1);
    /// assert_eq!(request.payload_len(), Some(200_000));
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        let credit_charge = match command.credit_class() {
            CreditClass::Negotiate | CreditClass::Cancel => 0,
            _ => 1,
        };
        Self {
            command,
            credit_charge,
            credits_requested: 1,
            message_id: 0,
            async_id: None,
            session_id: 0,
            tree_id: 0,
            flags: RequestFlags::default(),
            next_command_offset: 0,
            state: RequestState::Building,
            share: None,
            trial: None,
            body: Bytes::new(),
            payload_len: None,
            reply_credits: 0,
            reply_status: None,
            pre_parsed: false,
        }
    }

    /// Copy session and tree identifiers from the owning share.
    ///
    /// Negotiate always goes out with session id zero, and bootstrap commands
    /// leave the tree id unset.
    #[must_use]
    pub fn with_share(mut self, share: Arc<dyn ShareContext>) -> Self {
        if self.command != Command::NEGOTIATE {
            self.session_id = share.session_id();
        }
        if self.command.carries_tree_id() {
            self.tree_id = share.tree_id();
        }
        self.share = Some(share);
        self
    }

    /// Attach the encoded command body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Declare the payload size that determines the credit charge.
    #[must_use]
    pub fn with_payload_len(mut self, len: usize) -> Self {
        self.payload_len = Some(len);
        self
    }

    /// Forbid blocking for credit.
    #[must_use]
    pub fn no_block(mut self) -> Self {
        self.flags.insert(RequestFlags::NO_BLOCK);
        self
    }

    /// Ask for the request to be signed.
    #[must_use]
    pub fn signed(mut self) -> Self {
        self.flags.insert(RequestFlags::SIGNED);
        self
    }

    /// Mark the request as issued by the reconnect trial `token`.
    #[must_use]
    pub fn in_trial(mut self, token: TrialToken) -> Self {
        self.trial = Some(token);
        self
    }

    /// Target an earlier request for cancellation.
    ///
    /// Cancel reuses the target's message id and, once the server has gone
    /// async, its async id.
    #[must_use]
    pub fn cancelling(mut self, message_id: u64, async_id: Option<u64>) -> Self {
        self.message_id = message_id;
        self.async_id = async_id;
        if async_id.is_some() {
            self.flags.insert(RequestFlags::ASYNC);
        }
        self
    }

    #[must_use]
    pub fn command(&self) -> Command { self.command }

    #[must_use]
    pub fn credit_class(&self) -> CreditClass { self.command.credit_class() }

    #[must_use]
    pub fn credit_charge(&self) -> u16 { self.credit_charge }

    #[must_use]
    pub fn credits_requested(&self) -> u16 { self.credits_requested }

    #[must_use]
    pub fn message_id(&self) -> u64 { self.message_id }

    #[must_use]
    pub fn async_id(&self) -> Option<u64> { self.async_id }

    #[must_use]
    pub fn session_id(&self) -> u64 { self.session_id }

    #[must_use]
    pub fn tree_id(&self) -> u32 { self.tree_id }

    #[must_use]
    pub fn flags(&self) -> RequestFlags { self.flags }

    #[must_use]
    pub fn next_command_offset(&self) -> u32 { self.next_command_offset }

    #[must_use]
    pub fn state(&self) -> RequestState { self.state }

    #[must_use]
    pub fn share(&self) -> Option<&Arc<dyn ShareContext>> { self.share.as_ref() }

    #[must_use]
    pub fn trial(&self) -> Option<TrialToken> { self.trial }

    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// Payload size used for credit sizing; clamped by admission.
    #[must_use]
    pub fn payload_len(&self) -> Option<usize> { self.payload_len }

    /// Credits granted by the most recent reply.
    #[must_use]
    pub fn reply_credits(&self) -> u16 { self.reply_credits }

    #[must_use]
    pub fn reply_status(&self) -> Option<NtStatus> { self.reply_status }

    /// Report whether reply credits were already applied by the early pass.
    #[must_use]
    pub fn is_pre_parsed(&self) -> bool { self.pre_parsed }

    /// Report whether admission must fail instead of sleeping.
    #[must_use]
    pub fn forbids_blocking(&self) -> bool {
        self.flags.contains(RequestFlags::NO_BLOCK) || self.credit_class() == CreditClass::Echo
    }

    #[must_use]
    pub fn is_compound(&self) -> bool { self.flags.contains(RequestFlags::COMPOUND) }

    /// Report whether the owning share is being torn down.
    #[must_use]
    pub fn share_going_away(&self) -> bool { self.share.as_ref().is_some_and(|s| s.going_away()) }

    pub(crate) fn set_credit_charge(&mut self, credits: u16) { self.credit_charge = credits; }

    pub(crate) fn set_credits_requested(&mut self, credits: u16) {
        self.credits_requested = credits;
    }

    pub(crate) fn set_message_id(&mut self, message_id: u64) { self.message_id = message_id; }

    pub(crate) fn set_payload_len(&mut self, len: usize) { self.payload_len = Some(len); }

    pub(crate) fn set_next_command_offset(&mut self, offset: u32) {
        self.next_command_offset = offset;
    }

    pub(crate) fn insert_flags(&mut self, flags: RequestFlags) { self.flags.insert(flags); }

    /// Record the credit and status fields of a reply header.
    pub(crate) fn record_reply(&mut self, credits: u16, status: NtStatus) {
        self.reply_credits = credits;
        self.reply_status = Some(status);
    }

    /// Record that the server answered with an interim async response.
    pub(crate) fn record_async(&mut self, async_id: u64) { self.async_id = Some(async_id); }

    pub(crate) fn mark_pre_parsed(&mut self) { self.pre_parsed = true; }

    /// Clear the early-pass marker, returning whether it was set.
    pub(crate) fn take_pre_parsed(&mut self) -> bool { std::mem::take(&mut self.pre_parsed) }

    /// Move to `next`, which must be a legal successor.
    pub(crate) fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal request transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }

    /// Build the wire header for this request's current fields.
    #[must_use]
    pub fn header(&self) -> Smb2Header {
        let mut flags = HeaderFlags::EMPTY;
        if self.flags.contains(RequestFlags::SIGNED) {
            flags.insert(HeaderFlags::SIGNED);
        }
        if self.flags.contains(RequestFlags::RELATED_OPERATIONS) {
            flags.insert(HeaderFlags::RELATED_OPERATIONS);
        }
        let id = match self.async_id {
            Some(async_id) if self.flags.contains(RequestFlags::ASYNC) => {
                HeaderId::Async { async_id }
            }
            _ => HeaderId::Sync {
                process_id: CLIENT_PROCESS_ID,
                tree_id: self.tree_id,
            },
        };
        Smb2Header {
            credit_charge: self.credit_charge,
            credits: self.credits_requested,
            flags,
            next_command: self.next_command_offset,
            message_id: self.message_id,
            id,
            session_id: self.session_id,
            ..Smb2Header::request(self.command)
        }
    }

    /// Append header and body to `dst`, returning the header's patch slots.
    pub fn encode(&self, dst: &mut BytesMut) -> HeaderSlots {
        let slots = self.header().encode(dst);
        dst.put_slice(&self.body);
        slots
    }
}
