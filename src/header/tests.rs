//! Byte-exact checks for the SMB2 header codec.

use bytes::BytesMut;
use rstest::{fixture, rstest};

use super::*;
use crate::command::Command;

#[fixture]
fn write_header() -> Smb2Header {
    Smb2Header {
        credit_charge: 3,
        credits: 64,
        message_id: 0x0102_0304_0506_0708,
        session_id: 0x1111_2222_3333_4444,
        id: HeaderId::Sync {
            process_id: CLIENT_PROCESS_ID,
            tree_id: 7,
        },
        ..Smb2Header::request(Command::WRITE)
    }
}

#[rstest]
fn sync_header_layout_is_byte_exact(write_header: Smb2Header) {
    let mut buf = BytesMut::new();
    write_header.encode(&mut buf);

    assert_eq!(buf.len(), HEADER_LEN);
    assert_eq!(&buf[0..4], b"\xFESMB");
    assert_eq!(&buf[4..6], &[64, 0]);
    assert_eq!(&buf[6..8], &[3, 0]);
    assert_eq!(&buf[12..14], &[0x09, 0x00]);
    assert_eq!(&buf[14..16], &[64, 0]);
    assert_eq!(&buf[24..32], &[8, 7, 6, 5, 4, 3, 2, 1]);
    assert_eq!(&buf[32..36], &[0xFF, 0xFE, 0, 0]);
    assert_eq!(&buf[36..40], &[7, 0, 0, 0]);
    assert_eq!(&buf[40..48], &[0x44, 0x44, 0x33, 0x33, 0x22, 0x22, 0x11, 0x11]);
    assert_eq!(&buf[48..64], &[0u8; 16]);
}

#[rstest]
fn sync_header_round_trips(write_header: Smb2Header) {
    let mut buf = BytesMut::new();
    write_header.encode(&mut buf);

    let mut cursor = &buf[..];
    let decoded = Smb2Header::decode(&mut cursor).expect("decode header");
    assert_eq!(decoded, write_header);
    assert!(cursor.is_empty());
}

#[test]
fn async_header_replaces_process_and_tree_ids() {
    let header = Smb2Header {
        id: HeaderId::Async { async_id: 0xAB },
        ..Smb2Header::request(Command::CHANGE_NOTIFY)
    };
    let mut buf = BytesMut::new();
    header.encode(&mut buf);

    assert_eq!(&buf[16..20], &[0x02, 0, 0, 0]);
    assert_eq!(&buf[32..40], &[0xAB, 0, 0, 0, 0, 0, 0, 0]);

    let decoded = Smb2Header::decode(&mut &buf[..]).expect("decode async header");
    assert_eq!(decoded.async_id(), Some(0xAB));
    assert_eq!(decoded.tree_id(), None);
    assert!(decoded.flags.contains(HeaderFlags::ASYNC_COMMAND));
}

#[rstest]
fn partial_decode_stops_after_credit_response(write_header: Smb2Header) {
    let mut buf = BytesMut::new();
    write_header.encode(&mut buf);

    let mut shadow = &buf[..];
    let partial = Smb2Header::decode_partial(&mut shadow).expect("partial decode");
    assert_eq!(partial.credits, 64);
    assert_eq!(partial.command, Command::WRITE);
    assert_eq!(shadow.len(), HEADER_LEN - PARTIAL_HEADER_LEN);
}

#[rstest]
#[case::short(&b"\xFESMB\x40\x00"[..], HeaderError::Truncated { have: 6, need: PARTIAL_HEADER_LEN })]
#[case::protocol(
    &b"\xFFSMB\x40\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"[..],
    HeaderError::BadProtocolId(0x424D_53FF)
)]
#[case::structure_size(
    &b"\xFESMB\x41\x00\x00\x00\x16\x00\x00\xC0\x01\x00\x01\x00"[..],
    HeaderError::BadStructureSize(65)
)]
fn malformed_headers_are_rejected(#[case] bytes: &[u8], #[case] expected: HeaderError) {
    let err = Smb2Header::decode_partial(&mut &bytes[..]).expect_err("decode must fail");
    assert_eq!(err, expected);
}

#[rstest]
fn full_decode_requires_all_64_bytes(write_header: Smb2Header) {
    let mut buf = BytesMut::new();
    write_header.encode(&mut buf);

    let err = Smb2Header::decode(&mut &buf[..40]).expect_err("short header");
    assert_eq!(err, HeaderError::Truncated { have: 40, need: HEADER_LEN });
}

#[rstest]
fn slots_patch_late_bound_fields(write_header: Smb2Header) {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0xAA; 8]);
    let slots = write_header.encode(&mut buf);
    assert_eq!(slots.start(), 8);

    slots.set_credit_charge(&mut buf, 5);
    slots.set_credits(&mut buf, 1);
    slots.set_next_command(&mut buf, 136);
    slots.set_message_id(&mut buf, 42);
    slots.insert_flags(&mut buf, HeaderFlags::RELATED_OPERATIONS);
    slots.set_signature(&mut buf, &[0x5A; 16]);

    let decoded = Smb2Header::decode(&mut &buf[8..]).expect("decode patched header");
    assert_eq!(decoded.credit_charge, 5);
    assert_eq!(decoded.credits, 1);
    assert_eq!(decoded.next_command, 136);
    assert_eq!(decoded.message_id, 42);
    assert!(decoded.flags.contains(HeaderFlags::RELATED_OPERATIONS));
    assert_eq!(decoded.signature, [0x5A; 16]);
    assert_eq!(&buf[..8], &[0xAA; 8]);
}
