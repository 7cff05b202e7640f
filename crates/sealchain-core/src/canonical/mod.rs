//! Canonical serialization of ledger entries.
//!
//! Sealing and verification both require a stable, byte-exact
//! representation of an entry. This module produces it: UTF-8 JSON with a
//! fixed top-level field order, no whitespace, minimal escaping, and
//! payload mapping keys emitted in the exact order the producer supplied
//! them. Two conformant implementations in any language must produce
//! identical bytes for the same logical entry.
//!
//! # Canonical form
//!
//! - Top-level field order: `sequence`, `id`, `timestamp`, `previousHash`,
//!   `eventType`, `payload`.
//! - `id` in 8-4-4-4-12 lowercase hex form.
//! - `timestamp` in RFC 3339 with explicit offset; fractional seconds
//!   appear exactly as assigned by the writer.
//! - `previousHash` lowercased.
//! - Numbers are integer literals without exponent; floats are rejected
//!   before an entry ever reaches the writer.
//! - Strings use the default JSON escapes (`"`, `\\`, control characters);
//!   non-ASCII passes through unescaped.
//! - Payload mapping keys keep producer order. Nulls are emitted.
//!
//! Payload key order is an observable part of the signed content:
//! reordering a mapping's keys changes the seal.

use std::fmt::Write as _;

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::entry::EntryDraft;

/// Maximum payload nesting depth accepted for sealing.
///
/// Structures nested deeper than this are rejected up front rather than
/// risking stack exhaustion during canonicalization.
pub const MAX_PAYLOAD_DEPTH: usize = 128;

/// Rejections produced while validating a payload for sealing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PayloadError {
    /// The payload root was not a JSON mapping.
    #[error("payload root must be a mapping from string to value")]
    NotAMapping,

    /// A floating-point number was encountered.
    ///
    /// Sealed numbers must be integers: float formatting differs across
    /// platforms, which would make the canonical bytes ambiguous.
    #[error("float not allowed: sealed payload numbers must be integers")]
    FloatNotAllowed,

    /// A number is outside the signed 64-bit integer range.
    #[error("number out of range: {value} is outside signed 64-bit integer range")]
    NumberOutOfRange {
        /// String representation of the out-of-range number.
        value: String,
    },

    /// The payload nests deeper than [`MAX_PAYLOAD_DEPTH`] levels.
    #[error("max depth exceeded: payload nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The depth limit that was exceeded.
        max_depth: usize,
    },
}

/// Validates a producer payload against the sealing constraints.
///
/// The root must be a mapping; every number anywhere in the tree must be
/// an integer representable as `i64`; nesting is capped at
/// [`MAX_PAYLOAD_DEPTH`].
///
/// # Errors
///
/// Returns the first [`PayloadError`] found, depth-first in producer
/// order.
pub fn validate_payload(payload: &Value) -> Result<(), PayloadError> {
    if !payload.is_object() {
        return Err(PayloadError::NotAMapping);
    }
    validate_value(payload, 0)
}

fn validate_value(value: &Value, depth: usize) -> Result<(), PayloadError> {
    if depth > MAX_PAYLOAD_DEPTH {
        return Err(PayloadError::MaxDepthExceeded {
            max_depth: MAX_PAYLOAD_DEPTH,
        });
    }

    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => validate_number(n),
        Value::Array(items) => {
            for item in items {
                validate_value(item, depth + 1)?;
            }
            Ok(())
        },
        Value::Object(map) => {
            for entry in map.values() {
                validate_value(entry, depth + 1)?;
            }
            Ok(())
        },
    }
}

fn validate_number(n: &Number) -> Result<(), PayloadError> {
    if n.is_i64() {
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        // u64 values above i64::MAX have no portable integer literal.
        return Err(PayloadError::NumberOutOfRange {
            value: u.to_string(),
        });
    }
    Err(PayloadError::FloatNotAllowed)
}

/// Produces the canonical bytes of an entry-without-seal.
///
/// This is the exact input to the HMAC seal. The output is a pure function
/// of the draft's logical content and is identical across platforms and
/// processes.
///
/// # Errors
///
/// Returns [`PayloadError`] if the payload violates the sealing
/// constraints. The write path validates payloads before enqueue, so this
/// only fails on the verification path when a store returns a payload the
/// writer could never have sealed.
pub fn canonical_bytes(draft: &EntryDraft<'_>) -> Result<Vec<u8>, PayloadError> {
    validate_payload(draft.payload)?;

    let mut out = String::with_capacity(256);
    out.push_str("{\"sequence\":");
    let _ = write!(out, "{}", draft.sequence);
    out.push_str(",\"id\":\"");
    let _ = write!(out, "{}", draft.id);
    out.push_str("\",\"timestamp\":\"");
    out.push_str(&draft.timestamp.to_rfc3339());
    out.push_str("\",\"previousHash\":\"");
    out.push_str(&draft.previous_hash.to_ascii_lowercase());
    out.push_str("\",\"eventType\":");
    emit_string(draft.event_type, &mut out);
    out.push_str(",\"payload\":");
    emit_value(draft.payload, &mut out);
    out.push('}');

    Ok(out.into_bytes())
}

/// Emits a JSON value in canonical form.
fn emit_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, out),
        Value::String(s) => emit_string(s, out),
        Value::Array(items) => emit_array(items, out),
        Value::Object(map) => emit_object(map, out),
    }
}

/// Emits an integer literal. Validation has already rejected floats and
/// out-of-range values.
fn emit_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else {
        out.push_str(&n.to_string());
    }
}

/// Emits a string with the default JSON escapes.
///
/// Only `"` (U+0022), `\` (U+005C) and control characters U+0000..=U+001F
/// are escaped; control characters use the short escapes where defined and
/// `\uXXXX` otherwise. Everything else, including non-ASCII, passes
/// through as raw UTF-8.
fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('"');
}

fn emit_array(items: &[Value], out: &mut String) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        emit_value(item, out);
    }
    out.push(']');
}

/// Emits a mapping with keys in producer (insertion) order.
fn emit_object(map: &Map<String, Value>, out: &mut String) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        emit_string(key, out);
        out.push(':');
        emit_value(value, out);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn draft_with_payload(payload: &Value) -> EntryDraft<'_> {
        EntryDraft {
            sequence: 7,
            id: Uuid::nil(),
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            previous_hash: crate::entry::ZERO_GENESIS,
            event_type: "T",
            payload,
        }
    }

    // =========================================================================
    // Field order and formatting
    // =========================================================================

    #[test]
    fn emits_fields_in_fixed_order() {
        let payload = json!({});
        let bytes = canonical_bytes(&draft_with_payload(&payload)).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert_eq!(
            text,
            "{\"sequence\":7,\
             \"id\":\"00000000-0000-0000-0000-000000000000\",\
             \"timestamp\":\"1970-01-01T00:00:00+00:00\",\
             \"previousHash\":\"0000000000000000000000000000000000000000000000000000000000000000\",\
             \"eventType\":\"T\",\
             \"payload\":{}}"
        );
    }

    #[test]
    fn epoch_timestamp_has_no_fraction_and_explicit_offset() {
        let payload = json!({});
        let bytes = canonical_bytes(&draft_with_payload(&payload)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"timestamp\":\"1970-01-01T00:00:00+00:00\""));
    }

    #[test]
    fn microsecond_timestamp_is_preserved() {
        let payload = json!({});
        let mut draft = draft_with_payload(&payload);
        draft.timestamp = Utc.timestamp_opt(1_714_566_645, 123_456_000).unwrap();
        let text = String::from_utf8(canonical_bytes(&draft).unwrap()).unwrap();
        assert!(text.contains("2024-05-01T12:30:45.123456+00:00"));
    }

    #[test]
    fn previous_hash_is_lowercased() {
        let payload = json!({});
        let upper = crate::entry::ZERO_GENESIS.to_uppercase().replace('0', "A");
        let mut draft = draft_with_payload(&payload);
        draft.previous_hash = &upper;
        let text = String::from_utf8(canonical_bytes(&draft).unwrap()).unwrap();
        assert!(text.contains(&upper.to_ascii_lowercase()));
        assert!(!text.contains(&upper));
    }

    // =========================================================================
    // Payload ordering
    // =========================================================================

    #[test]
    fn payload_keys_keep_producer_order() {
        let payload = json!({"zebra": 1, "alpha": 2, "mid": {"b": 1, "a": 2}});
        let text =
            String::from_utf8(canonical_bytes(&draft_with_payload(&payload)).unwrap()).unwrap();
        assert!(text.contains(r#"{"zebra":1,"alpha":2,"mid":{"b":1,"a":2}}"#));
    }

    #[test]
    fn reordering_payload_keys_changes_the_bytes() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        let bytes_a = canonical_bytes(&draft_with_payload(&a)).unwrap();
        let bytes_b = canonical_bytes(&draft_with_payload(&b)).unwrap();
        assert_ne!(bytes_a, bytes_b);
    }

    #[test]
    fn nulls_are_emitted() {
        let payload = json!({"gone": null});
        let text =
            String::from_utf8(canonical_bytes(&draft_with_payload(&payload)).unwrap()).unwrap();
        assert!(text.contains(r#"{"gone":null}"#));
    }

    // =========================================================================
    // Escaping
    // =========================================================================

    #[test]
    fn non_ascii_passes_through_unescaped() {
        let payload = json!({"name": "café 中文 ❤"});
        let text =
            String::from_utf8(canonical_bytes(&draft_with_payload(&payload)).unwrap()).unwrap();
        assert!(text.contains("café 中文 ❤"));
        assert!(!text.contains("\\u"));
    }

    #[test]
    fn control_characters_use_short_escapes() {
        let payload = json!({"text": "a\nb\tc\u{0001}"});
        let text =
            String::from_utf8(canonical_bytes(&draft_with_payload(&payload)).unwrap()).unwrap();
        assert!(text.contains(r"a\nb\tc"));
    }

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        let payload = json!({"text": "say \"hi\" \\ done"});
        let text =
            String::from_utf8(canonical_bytes(&draft_with_payload(&payload)).unwrap()).unwrap();
        assert!(text.contains(r#"say \"hi\" \\ done"#));
    }

    #[test]
    fn event_type_is_escaped_like_any_string() {
        let payload = json!({});
        let mut draft = draft_with_payload(&payload);
        draft.event_type = "with \"quotes\"";
        let text = String::from_utf8(canonical_bytes(&draft).unwrap()).unwrap();
        assert!(text.contains(r#""eventType":"with \"quotes\"""#));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn rejects_non_mapping_root() {
        assert_eq!(
            validate_payload(&json!([1, 2, 3])),
            Err(PayloadError::NotAMapping)
        );
        assert_eq!(validate_payload(&json!(null)), Err(PayloadError::NotAMapping));
        assert_eq!(validate_payload(&json!("s")), Err(PayloadError::NotAMapping));
    }

    #[test]
    fn rejects_floats_anywhere() {
        assert_eq!(
            validate_payload(&json!({"x": 1.5})),
            Err(PayloadError::FloatNotAllowed)
        );
        assert_eq!(
            validate_payload(&json!({"deep": {"list": [1, 2.5]}})),
            Err(PayloadError::FloatNotAllowed)
        );
    }

    #[test]
    fn rejects_u64_above_i64_max() {
        let above = (i64::MAX as u64) + 1;
        let payload = json!({ "x": above });
        assert!(matches!(
            validate_payload(&payload),
            Err(PayloadError::NumberOutOfRange { .. })
        ));
    }

    #[test]
    fn accepts_i64_extremes_and_negatives() {
        let payload = json!({"max": i64::MAX, "min": i64::MIN, "neg": -7});
        assert_eq!(validate_payload(&payload), Ok(()));
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut value = json!(0);
        for _ in 0..(MAX_PAYLOAD_DEPTH + 2) {
            value = json!({ "n": value });
        }
        assert!(matches!(
            validate_payload(&value),
            Err(PayloadError::MaxDepthExceeded { .. })
        ));
    }

    // =========================================================================
    // Determinism
    // =========================================================================

    /// Strategy for payload values that satisfy the sealing constraints.
    fn payload_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|i| Value::Number(i.into())),
            "[a-zA-Z0-9 _\u{00e9}\u{4e2d}]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,8}", inner), 0..6).prop_map(|pairs| {
                    let mut map = Map::new();
                    for (k, v) in pairs {
                        map.insert(k, v);
                    }
                    Value::Object(map)
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn serializing_twice_is_byte_identical(pairs in prop::collection::vec(("[a-z]{1,8}", payload_value()), 0..8)) {
            let mut map = Map::new();
            for (k, v) in pairs {
                map.insert(k, v);
            }
            let payload = Value::Object(map);

            let first = canonical_bytes(&draft_with_payload(&payload)).unwrap();
            let second = canonical_bytes(&draft_with_payload(&payload)).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn canonical_bytes_round_trip_through_json(pairs in prop::collection::vec(("[a-z]{1,8}", payload_value()), 0..8)) {
            let mut map = Map::new();
            for (k, v) in pairs {
                map.insert(k, v);
            }
            let payload = Value::Object(map);

            let bytes = canonical_bytes(&draft_with_payload(&payload)).unwrap();
            let parsed: Value = serde_json::from_slice(&bytes).unwrap();
            let reparsed_payload = parsed.get("payload").unwrap().clone();
            let again = canonical_bytes(&draft_with_payload(&reparsed_payload)).unwrap();
            prop_assert_eq!(bytes, again);
        }
    }
}
