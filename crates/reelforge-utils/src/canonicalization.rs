//! Deterministic JSON emission.
//!
//! Two forms are produced:
//! - [`emit_jcs`]: compact RFC 8785 (JCS) output for machine-readable
//!   summaries and listings.
//! - [`to_canonical_pretty`]: sorted keys, two-space indentation and a final
//!   newline. Project documents are stored this way so that saving an
//!   unchanged project is byte-identical and diffs stay readable.

use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a value as JCS-canonical JSON (RFC 8785).
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// Emit a value as pretty JSON with sorted object keys and a trailing newline.
///
/// Going through `serde_json::Value` sorts every object's keys (the map is a
/// `BTreeMap`), independent of struct field order or the insertion order of
/// any nested maps.
pub fn to_canonical_pretty<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let mut out = serde_json::to_string_pretty(&json_value)
        .with_context(|| "Failed to render canonical JSON")?;
    out.push('\n');
    Ok(out)
}

/// BLAKE3 hex digest of the given bytes
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Unordered {
        zeta: u32,
        alpha: &'static str,
        nested: HashMap<&'static str, u32>,
    }

    #[test]
    fn test_emit_jcs_sorts_keys() {
        let value = json!({"b": 2, "a": [true, null], "c": {"y": 1, "x": 0}});
        assert_eq!(
            emit_jcs(&value).unwrap(),
            r#"{"a":[true,null],"b":2,"c":{"x":0,"y":1}}"#
        );
    }

    #[test]
    fn test_canonical_pretty_is_sorted_and_terminated() {
        let mut nested = HashMap::new();
        nested.insert("second", 2);
        nested.insert("first", 1);
        let value = Unordered {
            zeta: 1,
            alpha: "a",
            nested,
        };

        let out = to_canonical_pretty(&value).unwrap();
        assert_eq!(
            out,
            "{\n  \"alpha\": \"a\",\n  \"nested\": {\n    \"first\": 1,\n    \"second\": 2\n  },\n  \"zeta\": 1\n}\n"
        );
    }

    #[test]
    fn test_canonical_pretty_is_stable_across_reparse() {
        let value = json!({"script": [{"text": "Hello", "id": "L1", "confidence": 0.35}], "project": "demo"});
        let first = to_canonical_pretty(&value).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(to_canonical_pretty(&reparsed).unwrap(), first);
    }

    #[test]
    fn test_content_hash_is_hex() {
        let hash = content_hash(b"reelforge");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, content_hash(b"reelforge"));
        assert_ne!(hash, content_hash(b"reelforge\n"));
    }
}
