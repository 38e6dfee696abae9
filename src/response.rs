//! Reply handling: early credit extraction, full parse and the signing
//! decision.
//!
//! Credits are applied by a cheap partial parse before any signature check
//! so that waiting requests are released as soon as a reply lands. The full
//! parse then validates the header against its request without counting the
//! credits twice.

use log::debug;

use crate::{
    channel::Channel,
    command::CreditClass,
    header::{HeaderError, HeaderFlags, NtStatus, Smb2Header, UNSOLICITED_MESSAGE_ID},
    request::Request,
};

const MESSAGE_ID_RANGE: std::ops::Range<usize> = 24..32;

/// Read the message id of an encoded header without validating it.
#[must_use]
pub fn peek_message_id(reply: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = reply.get(MESSAGE_ID_RANGE)?.try_into().ok()?;
    Some(crate::byte_order::read_wire_u64(bytes))
}

/// Apply `reply`'s granted credits before the reply is fully parsed.
///
/// Works on a shadow copy of the reply cursor so the caller's position is
/// untouched. Compound replies, unsolicited notifications and replies whose
/// message id or command do not match `request` are left to the full parse,
/// which rejects a mismatch before any credit is applied.
///
/// # Errors
///
/// Returns [`HeaderError`] if the leading header fields are malformed; the
/// ledger is not touched in that case.
pub fn extract_credits(
    channel: &Channel,
    request: &mut Request,
    reply: &[u8],
) -> Result<(), HeaderError> {
    if request.is_compound() || peek_message_id(reply) != Some(request.message_id()) {
        return Ok(());
    }
    let mut shadow = reply;
    let partial = Smb2Header::decode_partial(&mut shadow)?;
    if partial.command != request.command() {
        return Ok(());
    }
    request.record_reply(partial.credits, partial.status);
    channel.increment(request);
    request.mark_pre_parsed();
    Ok(())
}

/// What a fully parsed reply means for its request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// The final reply.
    Final(Smb2Header),
    /// An interim `STATUS_PENDING` reply; the final one is still to come.
    Interim(Smb2Header),
    /// A server notification not addressed to any request.
    Unsolicited(Smb2Header),
}

/// Fully parse one reply header for `request`, advancing `src` past it.
///
/// Credits are applied here unless [`extract_credits`] already did.
///
/// # Errors
///
/// Returns [`HeaderError`] when the header is malformed, is not a response,
/// or names a different command or message id than `request`.
pub fn parse_reply(
    channel: &Channel,
    request: &mut Request,
    src: &mut &[u8],
) -> Result<ReplyDisposition, HeaderError> {
    let header = Smb2Header::decode(src)?;
    if !header.flags.contains(HeaderFlags::SERVER_TO_REDIR) {
        return Err(HeaderError::NotAResponse);
    }
    if header.message_id == UNSOLICITED_MESSAGE_ID {
        debug!("{} unsolicited {} notification", channel.id(), header.command);
        return Ok(ReplyDisposition::Unsolicited(header));
    }
    if header.command != request.command() {
        return Err(HeaderError::CommandMismatch {
            expected: request.command(),
            found: header.command,
        });
    }
    if header.message_id != request.message_id() {
        return Err(HeaderError::MessageIdMismatch {
            expected: request.message_id(),
            found: header.message_id,
        });
    }

    if !request.take_pre_parsed() {
        request.record_reply(header.credits, header.status);
        channel.increment(request);
    }

    match header.async_id() {
        Some(async_id) if header.status == NtStatus::PENDING => {
            request.record_async(async_id);
            Ok(ReplyDisposition::Interim(header))
        }
        _ => Ok(ReplyDisposition::Final(header)),
    }
}

/// Why a reply's signature is not checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Negotiate precedes any signing key.
    Negotiate,
    /// The transform layer already authenticated the message.
    Encrypted,
    /// Interim async replies are never signed.
    Interim,
    /// No session, so no key.
    NoSession,
    /// Neither the reply nor the session asks for signing.
    Unsigned,
}

/// Whether a reply's signature must be verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureCheck {
    Skip(SkipReason),
    Verify,
}

/// Decide whether `header`, a reply to `request`, needs verification.
///
/// # Examples
///
/// ```
/// use smb2_flow::{
///     command::Command,
///     header::{HeaderFlags, Smb2Header},
///     request::Request,
///     response::{SignatureCheck, SkipReason, signature_check},
/// };
///
/// let request = Request::new(Command::NEGOTIATE);
/// let mut header = Smb2Header::request(Command::NEGOTIATE);
/// header.flags = HeaderFlags::SIGNED;
/// assert_eq!(
///     signature_check(&request, &header),
///     SignatureCheck::Skip(SkipReason::Negotiate)
/// );
/// ```
#[must_use]
pub fn signature_check(request: &Request, header: &Smb2Header) -> SignatureCheck {
    if request.credit_class() == CreditClass::Negotiate {
        return SignatureCheck::Skip(SkipReason::Negotiate);
    }
    let share = request.share();
    if share.is_some_and(|s| s.encrypted()) {
        return SignatureCheck::Skip(SkipReason::Encrypted);
    }
    if header.status == NtStatus::PENDING && header.is_async() {
        return SignatureCheck::Skip(SkipReason::Interim);
    }
    if header.session_id == 0 {
        return SignatureCheck::Skip(SkipReason::NoSession);
    }
    if header.flags.contains(HeaderFlags::SIGNED) || share.is_some_and(|s| s.signing_required()) {
        SignatureCheck::Verify
    } else {
        SignatureCheck::Skip(SkipReason::Unsigned)
    }
}

/// Checks a reply signature with the session's signing key.
///
/// `frame` is the complete reply message, header included; for a compound
/// reply it is one member with its padding.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, header: &Smb2Header, frame: &[u8]) -> bool;
}

impl<F> SignatureVerifier for F
where
    F: Fn(&Smb2Header, &[u8]) -> bool + Send + Sync,
{
    fn verify(&self, header: &Smb2Header, frame: &[u8]) -> bool { self(header, frame) }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;
    use crate::{
        command::Command,
        header::HeaderId,
        request::RequestState,
        test_helpers::{StaticShare, started_channel},
    };

    fn sequenced(command: Command, message_id: u64) -> Request {
        let mut request = Request::new(command);
        request.advance(RequestState::CreditPending);
        request.set_message_id(message_id);
        request.advance(RequestState::Sequenced);
        request
    }

    fn reply(command: Command, message_id: u64, credits: u16) -> Smb2Header {
        Smb2Header {
            credits,
            flags: HeaderFlags::SERVER_TO_REDIR,
            message_id,
            session_id: 0x41,
            ..Smb2Header::request(command)
        }
    }

    fn encoded(header: &Smb2Header) -> BytesMut {
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        buf
    }

    #[test]
    fn early_extraction_counts_credits_once() {
        let channel = started_channel(4);
        let mut request = sequenced(Command::READ, 0);
        let buf = encoded(&reply(Command::READ, 0, 3));

        extract_credits(&channel, &mut request, &buf).expect("partial parse");
        assert_eq!(channel.credit_snapshot().credits_granted, 7);
        assert!(request.is_pre_parsed());

        let mut cursor = &buf[..];
        let disposition = parse_reply(&channel, &mut request, &mut cursor).expect("full parse");
        assert!(matches!(disposition, ReplyDisposition::Final(_)));
        assert_eq!(channel.credit_snapshot().credits_granted, 7);
        assert!(cursor.is_empty());
    }

    #[test]
    fn compound_members_skip_early_extraction() {
        let channel = started_channel(4);
        let mut chain = [sequenced(Command::CREATE, 0), sequenced(Command::CLOSE, 1)];
        crate::compound::encode_chain(&mut chain);
        let buf = encoded(&reply(Command::CREATE, 0, 3));

        extract_credits(&channel, &mut chain[0], &buf).expect("skipped");
        assert_eq!(channel.credit_snapshot().credits_granted, 4);

        let mut cursor = &buf[..];
        parse_reply(&channel, &mut chain[0], &mut cursor).expect("full parse");
        assert_eq!(channel.credit_snapshot().credits_granted, 7);
    }

    #[test]
    fn interim_reply_records_async_id() {
        let channel = started_channel(4);
        let mut request = sequenced(Command::CHANGE_NOTIFY, 2);
        let header = Smb2Header {
            status: NtStatus::PENDING,
            id: HeaderId::Async { async_id: 0x99 },
            ..reply(Command::CHANGE_NOTIFY, 2, 1)
        };
        let buf = encoded(&header);

        let mut cursor = &buf[..];
        let disposition = parse_reply(&channel, &mut request, &mut cursor).expect("parsed");

        assert!(matches!(disposition, ReplyDisposition::Interim(_)));
        assert_eq!(request.async_id(), Some(0x99));
        assert_eq!(channel.credit_snapshot().credits_granted, 5);
    }

    #[test]
    fn unsolicited_notification_leaves_ledger_alone() {
        let channel = started_channel(4);
        let mut request = sequenced(Command::READ, 0);
        let buf = encoded(&reply(Command::OPLOCK_BREAK, UNSOLICITED_MESSAGE_ID, 9));

        extract_credits(&channel, &mut request, &buf).expect("skipped");
        let mut cursor = &buf[..];
        let disposition = parse_reply(&channel, &mut request, &mut cursor).expect("parsed");

        assert!(matches!(disposition, ReplyDisposition::Unsolicited(_)));
        assert_eq!(channel.credit_snapshot().credits_granted, 4);
    }

    #[rstest]
    #[case::wrong_id(reply(Command::READ, 5, 3))]
    #[case::wrong_command(reply(Command::WRITE, 0, 3))]
    fn misrouted_reply_is_never_credited(#[case] header: Smb2Header) {
        let channel = started_channel(4);
        let mut request = sequenced(Command::READ, 0);
        let buf = encoded(&header);

        extract_credits(&channel, &mut request, &buf).expect("left to full parse");
        assert!(!request.is_pre_parsed());
        let mut cursor = &buf[..];
        assert!(parse_reply(&channel, &mut request, &mut cursor).is_err());

        assert_eq!(channel.credit_snapshot().credits_granted, 4);
        assert_eq!(request.reply_credits(), 0);
    }

    #[rstest]
    #[case::request_header(
        Smb2Header { flags: HeaderFlags::EMPTY, ..reply(Command::READ, 0, 1) },
        HeaderError::NotAResponse
    )]
    #[case::wrong_command(
        reply(Command::WRITE, 0, 1),
        HeaderError::CommandMismatch { expected: Command::READ, found: Command::WRITE }
    )]
    #[case::wrong_id(
        reply(Command::READ, 7, 1),
        HeaderError::MessageIdMismatch { expected: 0, found: 7 }
    )]
    fn mismatched_replies_are_rejected(#[case] header: Smb2Header, #[case] expected: HeaderError) {
        let channel = started_channel(4);
        let mut request = sequenced(Command::READ, 0);
        let buf = encoded(&header);
        let mut cursor = &buf[..];
        assert_eq!(parse_reply(&channel, &mut request, &mut cursor), Err(expected));
        assert_eq!(channel.credit_snapshot().credits_granted, 4);
    }

    #[rstest]
    #[case::unsigned(StaticShare::default(), HeaderFlags::SERVER_TO_REDIR, SignatureCheck::Skip(SkipReason::Unsigned))]
    #[case::signed(
        StaticShare::default(),
        HeaderFlags::SERVER_TO_REDIR | HeaderFlags::SIGNED,
        SignatureCheck::Verify
    )]
    #[case::required(StaticShare::default().signing_required(), HeaderFlags::SERVER_TO_REDIR, SignatureCheck::Verify)]
    #[case::encrypted(
        StaticShare::default().encrypted().signing_required(),
        HeaderFlags::SERVER_TO_REDIR | HeaderFlags::SIGNED,
        SignatureCheck::Skip(SkipReason::Encrypted)
    )]
    fn signing_decision(
        #[case] share: StaticShare,
        #[case] flags: HeaderFlags,
        #[case] expected: SignatureCheck,
    ) {
        let request = Request::new(Command::READ).with_share(Arc::new(share));
        let header = Smb2Header {
            flags,
            ..reply(Command::READ, 0, 1)
        };
        assert_eq!(signature_check(&request, &header), expected);
    }

    #[test]
    fn sessionless_replies_are_not_verified() {
        let request = Request::new(Command::SESSION_SETUP);
        let header = Smb2Header {
            flags: HeaderFlags::SERVER_TO_REDIR | HeaderFlags::SIGNED,
            session_id: 0,
            ..reply(Command::SESSION_SETUP, 1, 1)
        };
        assert_eq!(
            signature_check(&request, &header),
            SignatureCheck::Skip(SkipReason::NoSession)
        );
    }
}
