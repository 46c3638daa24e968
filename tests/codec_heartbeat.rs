//! Unit tests for heartbeat encoding and decoding in the STOMP codec.

use bytes::BytesMut;
use stomp_websocket::codec::{StompCodec, StompItem};
use stomp_websocket::{Frame, ParseError};
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn decode_single_lf_as_heartbeat() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&[0x0Au8][..]);
    let item = codec
        .decode(&mut buf)
        .expect("decode failed")
        .expect("no item");
    assert_eq!(item, StompItem::Heartbeat);
    assert!(
        buf.is_empty(),
        "buffer should be empty after consuming heartbeat"
    );
}

#[test]
fn decode_crlf_as_heartbeat() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"\r\n"[..]);
    let item = codec
        .decode(&mut buf)
        .expect("decode failed")
        .expect("no item");
    assert_eq!(item, StompItem::Heartbeat);
    assert!(buf.is_empty());
}

#[test]
fn decode_multiple_consecutive_heartbeats() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&[0x0A, 0x0A, 0x0A][..]);

    for remaining in [2, 1, 0] {
        let item = codec
            .decode(&mut buf)
            .expect("decode failed")
            .expect("no item");
        assert_eq!(item, StompItem::Heartbeat);
        assert_eq!(buf.len(), remaining);
    }
    assert!(codec.decode(&mut buf).expect("decode failed").is_none());
}

#[test]
fn decode_heartbeat_before_frame() {
    let mut codec = StompCodec::new();
    let data = b"\nSEND\ndestination:/queue/test\n\nhello\0";
    let mut buf = BytesMut::from(&data[..]);

    let item1 = codec
        .decode(&mut buf)
        .expect("decode failed")
        .expect("no item");
    assert_eq!(item1, StompItem::Heartbeat);

    let item2 = codec
        .decode(&mut buf)
        .expect("decode failed")
        .expect("no item");
    match item2 {
        StompItem::Frame(f) => {
            assert_eq!(f.command, "SEND");
            assert_eq!(f.body, "hello");
        }
        _ => panic!("expected frame, got {:?}", item2),
    }
}

#[test]
fn decode_swallows_lf_after_sentinel() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"RECEIPT\nreceipt-id:1\n\n\0\n"[..]);
    let item = codec
        .decode(&mut buf)
        .expect("decode failed")
        .expect("no item");
    assert!(matches!(item, StompItem::Frame(_)));
    assert!(buf.is_empty(), "trailing LF belongs to the frame");
}

#[test]
fn decode_two_frames_in_one_payload() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(
        &b"MESSAGE\nsubscription:sub-0\n\none\0MESSAGE\nsubscription:sub-0\n\ntwo\0"[..],
    );
    let mut bodies = Vec::new();
    while let Some(item) = codec.decode_eof(&mut buf).expect("decode failed") {
        if let StompItem::Frame(f) = item {
            bodies.push(f.body);
        }
    }
    assert_eq!(bodies, vec!["one", "two"]);
}

#[test]
fn decode_waits_for_sentinel_until_eof() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"MESSAGE\n\npartial"[..]);
    assert!(codec.decode(&mut buf).expect("decode failed").is_none());
    let item = codec
        .decode_eof(&mut buf)
        .expect("decode failed")
        .expect("no item");
    assert_eq!(item, StompItem::Frame(Frame::new("MESSAGE").set_body("partial")));
    assert!(buf.is_empty());
}

#[test]
fn decode_error_consumes_bad_frame() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"SEND\nbroken\n\n\0\nRECEIPT\nreceipt-id:9\n\n\0"[..]);
    let err = codec.decode(&mut buf).expect_err("bad header");
    assert_eq!(err, ParseError::MalformedHeader("broken".to_string()));

    // the next frame is still reachable
    let item = codec
        .decode(&mut buf)
        .expect("decode failed")
        .expect("no item");
    match item {
        StompItem::Frame(f) => assert_eq!(f.get_header("receipt-id"), Some("9")),
        other => panic!("expected frame, got {:?}", other),
    }
}

#[test]
fn encode_heartbeat_is_single_lf() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::new();
    codec
        .encode(StompItem::Heartbeat, &mut buf)
        .expect("encode failed");
    assert_eq!(&buf[..], b"\n");
}

#[test]
fn encode_frame_item_appends_wire_form() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::new();
    let f = Frame::new("SEND")
        .header("destination", "/queue/a")
        .set_body("hi");
    codec
        .encode(StompItem::Frame(f), &mut buf)
        .expect("encode failed");
    assert_eq!(&buf[..], b"SEND\ndestination:/queue/a\n\nhi\0");
}
