use chorus_model::{Envelope, Event};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

// Messages a live call receives continuously, plus the one-off handshake reply.
const HEARTBEAT_ACK: &str = r#"{"op":6,"d":{"t":1501184119561},"seq":12}"#;
const SPEAKING: &str = r#"{"op":5,"d":{"user_id":"1234","ssrc":77,"speaking":1},"seq":13}"#;
const READY: &str = r#"{
    "op": 2,
    "d": {
        "ssrc": 1,
        "ip": "127.0.0.1",
        "port": 1234,
        "modes": ["aead_aes256_gcm_rtpsize", "aead_xchacha20_poly1305_rtpsize", "xsalsa20_poly1305_lite"],
        "heartbeat_interval": 1
    }
}"#;
// Body before opcode, which forces the body to be buffered until the opcode is known.
const READY_BODY_FIRST: &str = r#"{
    "d": {
        "ssrc": 1,
        "ip": "127.0.0.1",
        "port": 1234,
        "modes": ["aead_aes256_gcm_rtpsize", "aead_xchacha20_poly1305_rtpsize", "xsalsa20_poly1305_lite"],
        "heartbeat_interval": 1
    },
    "op": 2
}"#;

fn decode(json: &str) -> (Event, Option<u64>) {
    let event = serde_json::from_str::<Event>(json).unwrap();
    let Envelope { seq } = serde_json::from_str(json).unwrap();
    (event, seq)
}

pub fn inbound(c: &mut Criterion) {
    c.bench_function("heartbeat ack with seq", |b| {
        b.iter(|| decode(black_box(HEARTBEAT_ACK)))
    });

    c.bench_function("speaking update with seq", |b| {
        b.iter(|| decode(black_box(SPEAKING)))
    });

    c.bench_function("ready", |b| {
        b.iter(|| serde_json::from_str::<Event>(black_box(READY)))
    });

    c.bench_function("ready, body first", |b| {
        b.iter(|| serde_json::from_str::<Event>(black_box(READY_BODY_FIRST)))
    });
}

criterion_group!(benches, inbound);
criterion_main!(benches);
