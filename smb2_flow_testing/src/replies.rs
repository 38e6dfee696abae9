//! Builders for server reply frames.

use bytes::{BufMut, Bytes, BytesMut};
use smb2_flow::{
    compound::{CompoundReplyCursor, padding_for},
    header::{HeaderFlags, NtStatus, Smb2Header},
};

/// Reply header answering `request` with `credits` granted.
#[must_use]
pub fn reply_to(request: &Smb2Header, credits: u16) -> Smb2Header {
    Smb2Header {
        credit_charge: request.credit_charge,
        status: NtStatus::SUCCESS,
        credits,
        flags: HeaderFlags::SERVER_TO_REDIR,
        next_command: 0,
        signature: [0; 16],
        ..*request
    }
}

/// Encode a single reply frame.
#[must_use]
pub fn encode_reply(header: &Smb2Header, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    buf.put_slice(body);
    buf.freeze()
}

/// Answers request frames the way a cooperative server would.
///
/// Every request, or every member of a chain, gets a reply granting the
/// configured credits. A chain is answered with one chained reply keyed by
/// the first member's message id.
#[derive(Clone, Debug)]
pub struct Responder {
    credits: u16,
    status: NtStatus,
    signed: bool,
    interim_async_id: Option<u64>,
}

impl Responder {
    #[must_use]
    pub fn granting(credits: u16) -> Self {
        Self {
            credits,
            status: NtStatus::SUCCESS,
            signed: false,
            interim_async_id: None,
        }
    }

    /// Answer with `status` instead of success.
    #[must_use]
    pub fn with_status(mut self, status: NtStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the `SIGNED` flag on every reply.
    #[must_use]
    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    /// Precede each single reply with an interim `STATUS_PENDING` reply.
    #[must_use]
    pub fn going_async(mut self, async_id: u64) -> Self {
        self.interim_async_id = Some(async_id);
        self
    }

    fn header_for(&self, request: &Smb2Header) -> Smb2Header {
        let mut header = Smb2Header {
            status: self.status,
            ..reply_to(request, self.credits)
        };
        if self.signed {
            header.flags.insert(HeaderFlags::SIGNED);
        }
        header
    }

    /// Produce `(message_id, reply)` pairs for one sent `frame`.
    ///
    /// # Panics
    ///
    /// Panics if `frame` does not hold well-formed request headers.
    #[must_use]
    pub fn respond(&self, frame: &Bytes) -> Vec<(u64, Bytes)> {
        let members: Vec<Smb2Header> = CompoundReplyCursor::new(frame)
            .map(|member| member.expect("well-formed request frame").header)
            .collect();
        match members.as_slice() {
            [] => Vec::new(),
            [single] if single.command == smb2_flow::command::Command::CANCEL => Vec::new(),
            [single] => self.respond_single(single),
            [first, ..] => vec![(first.message_id, self.chained(&members))],
        }
    }

    fn respond_single(&self, request: &Smb2Header) -> Vec<(u64, Bytes)> {
        let mut replies = Vec::new();
        if let Some(async_id) = self.interim_async_id {
            let interim = Smb2Header {
                status: NtStatus::PENDING,
                id: smb2_flow::header::HeaderId::Async { async_id },
                ..reply_to(request, self.credits)
            };
            replies.push((request.message_id, encode_reply(&interim, &[])));
        }
        let mut last = self.header_for(request);
        if let Some(async_id) = self.interim_async_id {
            last.id = smb2_flow::header::HeaderId::Async { async_id };
        }
        replies.push((request.message_id, encode_reply(&last, b"ok")));
        replies
    }

    fn chained(&self, members: &[Smb2Header]) -> Bytes {
        let mut buf = BytesMut::new();
        for (index, request) in members.iter().enumerate() {
            let mut header = self.header_for(request);
            if index > 0 {
                header.flags.insert(HeaderFlags::RELATED_OPERATIONS);
            }
            let slots = header.encode(&mut buf);
            buf.put_slice(b"ok");
            if index + 1 < members.len() {
                buf.put_bytes(0, padding_for(buf.len() - slots.start()));
                let next = u32::try_from(buf.len() - slots.start()).expect("member fits u32");
                slots.set_next_command(&mut buf, next);
            }
        }
        buf.freeze()
    }
}

/// Feed `channel` a reply to a `command` request granting `credits`.
///
/// # Panics
///
/// Never; the generated reply is always well formed.
pub fn grant(channel: &smb2_flow::Channel, command: smb2_flow::command::Command, credits: u16) {
    let mut request = smb2_flow::request::Request::new(command);
    let header = reply_to(&Smb2Header::request(command), credits);
    smb2_flow::response::extract_credits(channel, &mut request, &encode_reply(&header, &[]))
        .expect("generated reply is well formed");
}
