//! Deterministic canonicalization (spec §4.1).
//!
//! Object keys are sorted lexicographically at every depth, arrays keep
//! their order, numbers are re-emitted via `serde_json`'s own formatting
//! (integers with no trailing `.0`, no exponent games), and the result is
//! compact UTF-8 with no insignificant whitespace. Signing and verifying
//! both go through this one function — never reimplemented per caller.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Re-serialize a `serde_json::Value` with object keys sorted at every
/// depth. `serde_json::Map` already preserves insertion order, so the
/// only change needed is to walk the tree through a `BTreeMap`.
fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, val)| (k.clone(), sort_value(val)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, val) in sorted {
                out.insert(k, val);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// Canonicalize an already-constructed JSON value to its canonical bytes.
pub fn canonicalize_value(v: &Value) -> Vec<u8> {
    let sorted = sort_value(v);
    // serde_json's compact formatter has no insignificant whitespace and
    // preserves integer vs. float formatting, matching §4.1's requirement.
    serde_json::to_vec(&sorted).expect("canonical JSON value always serializes")
}

/// Canonicalize any `Serialize` value (convenience over `to_value` + `canonicalize_value`).
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    Ok(canonicalize_value(&v))
}

/// Canonical bytes as a UTF-8 string, for embedding in logs or hashing inputs
/// that want a `&str`.
pub fn canonicalize_to_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = canonicalize(value)?;
    Ok(String::from_utf8(bytes).expect("canonical JSON is valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_at_every_depth() {
        let v = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let canon = canonicalize_value(&v);
        assert_eq!(
            String::from_utf8(canon).unwrap(),
            r#"{"a":{"c":3,"d":2},"b":1}"#
        );
    }

    #[test]
    fn stable_round_trip() {
        let v = json!({"x": [3, 1, 2], "a": "hi"});
        let once = canonicalize_value(&v);
        let reparsed: Value = serde_json::from_slice(&once).unwrap();
        let twice = canonicalize_value(&reparsed);
        assert_eq!(once, twice);
    }

    #[test]
    fn preserves_array_order() {
        let v = json!({"a": [3, 1, 2]});
        let canon = String::from_utf8(canonicalize_value(&v)).unwrap();
        assert_eq!(canon, r#"{"a":[3,1,2]}"#);
    }
}
