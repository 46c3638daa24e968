//! Randomized round-trip checks: any frame whose header keys and values hold
//! no `:`, LF or surrounding whitespace, and whose body holds no NUL, decodes
//! back to itself.

use bytes::BytesMut;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stomp_websocket::codec::{StompCodec, StompItem};
use stomp_websocket::{Frame, encode_frame, parse_frame};
use tokio_util::codec::Decoder;

const COMMANDS: &[&str] = &[
    "SEND", "SUBSCRIBE", "UNSUBSCRIBE", "BEGIN", "COMMIT", "ABORT", "ACK", "MESSAGE", "RECEIPT",
    "ERROR", "CONNECTED",
];

fn token(rng: &mut StdRng, max: usize) -> String {
    let len = rng.gen_range(1..=max);
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn random_body(rng: &mut StdRng) -> String {
    let len = rng.gen_range(0..64);
    (0..len)
        .map(|_| match rng.gen_range(0..10) {
            0 => '\n',
            1 => ':',
            2 => ' ',
            3 => 'é',
            _ => char::from(rng.sample(Alphanumeric)),
        })
        .collect()
}

fn random_frame(rng: &mut StdRng) -> Frame {
    let command = COMMANDS[rng.gen_range(0..COMMANDS.len())];
    let mut frame = Frame::new(command);
    for _ in 0..rng.gen_range(0..6) {
        let key = token(rng, 12);
        let value = if rng.gen_bool(0.1) {
            String::new()
        } else {
            token(rng, 24)
        };
        frame.insert_header(key, value);
    }
    frame.set_body(random_body(rng))
}

#[test]
fn parse_inverts_encode() {
    let mut rng = StdRng::seed_from_u64(0x5704_u64);
    for _ in 0..500 {
        let frame = random_frame(&mut rng);
        let wire = encode_frame(&frame);
        let decoded = parse_frame(&wire).expect("round trip parse");
        assert_eq!(decoded, frame, "wire form was {:?}", wire);
    }
}

#[test]
fn codec_inverts_encode_for_batched_payloads() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let frames: Vec<Frame> = (0..rng.gen_range(1..5))
            .map(|_| random_frame(&mut rng))
            .collect();
        let mut payload = String::new();
        for f in &frames {
            if rng.gen_bool(0.3) {
                payload.push('\n');
            }
            payload.push_str(&encode_frame(f));
        }

        let mut codec = StompCodec::new();
        let mut buf = BytesMut::from(payload.as_bytes());
        let mut decoded = Vec::new();
        while let Some(item) = codec.decode_eof(&mut buf).expect("decode") {
            if let StompItem::Frame(f) = item {
                decoded.push(f);
            }
        }
        assert_eq!(decoded, frames);
    }
}
