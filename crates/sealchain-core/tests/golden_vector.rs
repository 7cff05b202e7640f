//! Pinned interoperability vectors.
//!
//! Any conformant implementation, in any language, must reproduce these
//! canonical bytes and seals byte-for-byte. If one of these assertions
//! breaks, the wire contract has changed.

use chrono::{TimeZone, Utc};
use sealchain_core::canonical::canonical_bytes;
use sealchain_core::entry::{EntryDraft, LedgerEntry, ZERO_GENESIS};
use sealchain_core::seal::Sealer;
use secrecy::SecretBox;
use serde_json::json;
use uuid::Uuid;

fn sealer_with_key(key: &[u8]) -> Sealer {
    Sealer::new(&SecretBox::new(key.to_vec().into_boxed_slice())).unwrap()
}

/// Seed vector: key `"k"`, genesis of 64 zeros, sequence 1, epoch
/// timestamp, event type `"T"`, empty payload.
#[test]
fn seed_vector_bytes_and_seal() {
    let id = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
    let timestamp = Utc.timestamp_opt(0, 0).unwrap();
    let payload = json!({});

    let draft = EntryDraft {
        sequence: 1,
        id,
        timestamp,
        previous_hash: ZERO_GENESIS,
        event_type: "T",
        payload: &payload,
    };

    let bytes = canonical_bytes(&draft).unwrap();
    assert_eq!(
        String::from_utf8(bytes.clone()).unwrap(),
        "{\"sequence\":1,\
         \"id\":\"00000000-0000-0000-0000-000000000001\",\
         \"timestamp\":\"1970-01-01T00:00:00+00:00\",\
         \"previousHash\":\"0000000000000000000000000000000000000000000000000000000000000000\",\
         \"eventType\":\"T\",\
         \"payload\":{}}"
    );

    let seal = sealer_with_key(b"k").seal(&bytes);
    assert_eq!(
        seal,
        "9b363579e412a96fe5bff4017806467584b7b53dcfae747f87d4a60848fbd242"
    );
}

/// Second vector: producer-ordered payload keys, a negative integer,
/// non-ASCII passthrough and a microsecond timestamp, chained onto the
/// seed vector's seal.
#[test]
fn ordered_payload_vector_bytes_and_seal() {
    let id = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();
    let timestamp = Utc.timestamp_opt(1_714_566_645, 123_456_000).unwrap();
    let payload = json!({
        "b": 1,
        "a": "é",
        "items": ["x", null, true],
        "nested": {"z": null, "y": -7}
    });

    let draft = EntryDraft {
        sequence: 2,
        id,
        timestamp,
        previous_hash: "9b363579e412a96fe5bff4017806467584b7b53dcfae747f87d4a60848fbd242",
        event_type: "ORDER_PLACED",
        payload: &payload,
    };

    let bytes = canonical_bytes(&draft).unwrap();
    assert_eq!(
        String::from_utf8(bytes.clone()).unwrap(),
        "{\"sequence\":2,\
         \"id\":\"00000000-0000-0000-0000-000000000002\",\
         \"timestamp\":\"2024-05-01T12:30:45.123456+00:00\",\
         \"previousHash\":\"9b363579e412a96fe5bff4017806467584b7b53dcfae747f87d4a60848fbd242\",\
         \"eventType\":\"ORDER_PLACED\",\
         \"payload\":{\"b\":1,\"a\":\"é\",\"items\":[\"x\",null,true],\"nested\":{\"z\":null,\"y\":-7}}}"
    );

    let seal = sealer_with_key(b"k").seal(&bytes);
    assert_eq!(
        seal,
        "a532f366aef72fa65e663c8f64112e71d2facbc500f622f252cd1a35160f9aab"
    );
}

/// The draft borrowed from a stored entry reproduces the same bytes as
/// the draft the writer sealed; the two paths cannot diverge.
#[test]
fn stored_entry_draft_matches_writer_draft() {
    let id = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
    let timestamp = Utc.timestamp_opt(0, 0).unwrap();
    let payload = json!({"k": "v"});

    let writer_draft = EntryDraft {
        sequence: 1,
        id,
        timestamp,
        previous_hash: ZERO_GENESIS,
        event_type: "T",
        payload: &payload,
    };
    let sealed = sealer_with_key(b"k").seal(&canonical_bytes(&writer_draft).unwrap());

    let stored = LedgerEntry {
        sequence: 1,
        id,
        timestamp,
        previous_hash: ZERO_GENESIS.to_string(),
        event_type: "T".to_string(),
        payload,
        current_hash: sealed.clone(),
    };

    let recomputed = sealer_with_key(b"k").seal(&canonical_bytes(&stored.draft()).unwrap());
    assert_eq!(recomputed, sealed);
}

/// Serialize, deserialize, re-serialize: canonical bytes are stable
/// across a storage round trip, including payload key order.
#[test]
fn canonical_bytes_survive_a_wire_round_trip() {
    let entry = LedgerEntry {
        sequence: 1,
        id: Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap(),
        timestamp: Utc.timestamp_opt(1_714_566_645, 123_456_000).unwrap(),
        previous_hash: ZERO_GENESIS.to_string(),
        event_type: "T".to_string(),
        payload: json!({"z": 1, "a": {"q": null, "b": [1, -2]}}),
        current_hash: "ab".repeat(32),
    };

    let before = canonical_bytes(&entry.draft()).unwrap();
    let wire = serde_json::to_string(&entry).unwrap();
    let back: LedgerEntry = serde_json::from_str(&wire).unwrap();
    let after = canonical_bytes(&back.draft()).unwrap();

    assert_eq!(before, after);
}
