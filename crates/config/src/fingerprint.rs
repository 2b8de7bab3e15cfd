//! Deterministic fingerprint over the protocol/governance files.
//!
//! Every ledger entry written during a session carries this hash, so a
//! verifier can tell which policy set was in force. JSON files are
//! normalized by canonical re-serialization before hashing; missing
//! files hash as a sentinel string instead of aborting.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Canonical sorted list of files that participate in the fingerprint.
/// Changing this list changes every fingerprint, so additions go at the
/// correct sorted position.
pub const FINGERPRINT_FILES: &[&str] = &[
    "coupling.json",
    "directives/axioms.md",
    "directives/conduct.md",
    "directives/escalation.md",
    "domain_weights.json",
    "role_shapes.json",
];

const MISSING_SENTINEL: &str = "[MISSING]";

/// `"sha256:" + hex(SHA256(concat(path || "\0" || content)))` over
/// [`FINGERPRINT_FILES`] in order.
pub fn config_fingerprint(protocol_dir: &Path) -> String {
    let mut hasher = Sha256::new();
    for rel in FINGERPRINT_FILES {
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");
        match std::fs::read_to_string(protocol_dir.join(rel)) {
            Ok(content) => hasher.update(normalize(rel, &content).as_bytes()),
            Err(_) => hasher.update(MISSING_SENTINEL.as_bytes()),
        }
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn normalize(rel: &str, content: &str) -> String {
    if rel.ends_with(".json") {
        match serde_json::from_str::<serde_json::Value>(content) {
            Ok(value) => canonical_json(&value),
            // Unparseable JSON still fingerprints, as raw text.
            Err(_) => content.replace("\r\n", "\n"),
        }
    } else {
        content.replace("\r\n", "\n")
    }
}

/// Serialize a JSON value with recursively sorted object keys and no
/// whitespace. This is the normalization used both here and as the
/// signing substrate for ledger entries.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_sorts_keys_recursively() {
        let v = json!({"b": 1, "a": {"z": true, "m": [1, {"y": 2, "x": 3}]}});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":{"m":[1,{"x":3,"y":2}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn fingerprint_is_stable_and_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("coupling.json"), r#"{"directives":{}}"#).unwrap();
        let a = config_fingerprint(dir.path());
        let b = config_fingerprint(dir.path());
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), "sha256:".len() + 64);
    }

    #[test]
    fn fingerprint_changes_when_a_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("coupling.json"), r#"{"directives":{}}"#).unwrap();
        let before = config_fingerprint(dir.path());
        std::fs::write(dir.path().join("role_shapes.json"), r#"{"banned":{}}"#).unwrap();
        let after = config_fingerprint(dir.path());
        assert_ne!(before, after);
    }

    #[test]
    fn json_key_order_does_not_matter() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("coupling.json"), r#"{"a":1,"b":2}"#).unwrap();
        std::fs::write(dir_b.path().join("coupling.json"), r#"{ "b": 2, "a": 1 }"#).unwrap();
        assert_eq!(
            config_fingerprint(dir_a.path()),
            config_fingerprint(dir_b.path())
        );
    }

    #[test]
    fn missing_files_hash_as_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        // All files missing still yields a deterministic fingerprint.
        let a = config_fingerprint(dir.path());
        let b = config_fingerprint(dir.path());
        assert_eq!(a, b);
    }
}
