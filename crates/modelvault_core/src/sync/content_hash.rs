//! Deterministic content fingerprint of a model payload.
//!
//! # Invariants
//! - The digest depends only on canonical structure: object keys are sorted,
//!   and `null`, `""`, `[]` and `{}` values are treated as absent.
//! - Array order is significant.
//! - Used for equality and change detection only, never for security.

use crate::model::data::ModelData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

/// Hex-encoded SHA-256 digest of a canonical `ModelData`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps a stored hex digest without recomputing it.
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the content hash of a model payload.
pub fn hash_model_data(data: &ModelData) -> ContentHash {
    // Serializing plain data structures with string keys cannot fail.
    let value = serde_json::to_value(data).unwrap_or(Value::Null);
    hash_value(&value)
}

/// Computes the content hash of an arbitrary JSON payload.
pub fn hash_value(value: &Value) -> ContentHash {
    let mut canonical = Vec::with_capacity(1024);
    if let Some(value) = canonicalize(value) {
        write_canonical(&mut canonical, &value);
    }
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    ContentHash(hex::encode(hasher.finalize()))
}

/// Drops empty values recursively; `None` means "absent".
fn canonicalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::Array(items) => {
            if items.is_empty() {
                return None;
            }
            // Empty members keep their slot so positions stay meaningful.
            Some(Value::Array(
                items
                    .iter()
                    .map(|item| canonicalize(item).unwrap_or(Value::Null))
                    .collect(),
            ))
        }
        Value::Object(fields) => {
            let kept: Map<String, Value> = fields
                .iter()
                .filter_map(|(key, field)| canonicalize(field).map(|field| (key.clone(), field)))
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(Value::Object(kept))
            }
        }
        other => Some(other.clone()),
    }
}

fn write_canonical(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(flag) => out.extend_from_slice(if *flag { b"true" } else { b"false" }),
        Value::Number(number) => out.extend_from_slice(number.to_string().as_bytes()),
        Value::String(text) => write_string(out, text),
        Value::Array(items) => {
            out.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                write_canonical(out, item);
            }
            out.push(b']');
        }
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            out.push(b'{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                write_string(out, key);
                out.push(b':');
                write_canonical(out, &fields[key]);
            }
            out.push(b'}');
        }
    }
}

fn write_string(out: &mut Vec<u8>, text: &str) {
    // serde_json string escaping is deterministic for a given input.
    let encoded = serde_json::to_string(text).unwrap_or_default();
    out.extend_from_slice(encoded.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::{hash_model_data, hash_value};
    use crate::model::data::{GraphElement, ModelData};
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_digest() {
        let left = json!({ "a": 1, "b": { "x": true, "y": "z" } });
        let right = json!({ "b": { "y": "z", "x": true }, "a": 1 });
        assert_eq!(hash_value(&left), hash_value(&right));
    }

    #[test]
    fn absent_and_empty_values_hash_the_same() {
        let sparse = json!({ "name": "n" });
        let padded = json!({ "name": "n", "notes": "", "tags": [], "meta": {}, "gone": null });
        assert_eq!(hash_value(&sparse), hash_value(&padded));
    }

    #[test]
    fn array_order_and_values_change_digest() {
        assert_ne!(hash_value(&json!([1, 2])), hash_value(&json!([2, 1])));
        assert_ne!(hash_value(&json!({ "a": 1 })), hash_value(&json!({ "a": 2 })));
    }

    #[test]
    fn digest_is_stable_across_calls() {
        let mut data = ModelData::default();
        data.elements.push(GraphElement::new("e1", "First"));
        let first = hash_model_data(&data);
        let second = hash_model_data(&data.clone());
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
        assert_eq!(first.short().len(), 12);
    }

    #[test]
    fn any_payload_change_changes_digest() {
        let empty = ModelData::default();
        let mut one = ModelData::default();
        one.elements.push(GraphElement::new("e1", "First"));
        assert_ne!(hash_model_data(&empty), hash_model_data(&one));
    }
}
