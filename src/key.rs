//! Cache key derivation.
//!
//! A cache key is either a single string or an ordered list of parts.
//! Hashing is a pure function of part content and order, so two keys
//! built from the same logical inputs always map to the same slot. The
//! result is percent-encoded so it can be embedded in a synthetic URL
//! when addressing request-keyed stores.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

/// Characters left verbatim when encoding a hashed key for URL embedding.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A composite cache key: a bare string or an ordered list of parts.
///
/// Parts are JSON values. Plain values contribute their string form,
/// objects and arrays contribute their JSON serialization, and `null`
/// parts contribute nothing.
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use subrequest_cache::CacheKey;
///
/// let key = CacheKey::from(vec![json!("products"), json!({"first": 8})]);
/// assert_eq!(key.hash(), CacheKey::from(vec![json!("products"), json!({"first": 8})]).hash());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    /// A single pre-built key string.
    Single(String),
    /// An ordered list of parts combined in sequence.
    Parts(Vec<Value>),
}

impl CacheKey {
    /// Derive the string form of this key.
    ///
    /// Parts are concatenated in order with no separator, then
    /// percent-encoded. The empty part list hashes to the empty string.
    /// Collision resistance is against accidental collisions from
    /// naturally varying inputs, not deliberate attack.
    pub fn hash(&self) -> String {
        let raw = match self {
            CacheKey::Single(key) => key.clone(),
            CacheKey::Parts(parts) => {
                let mut out = String::new();
                for part in parts {
                    append_part(&mut out, part);
                }
                out
            }
        };
        utf8_percent_encode(&raw, KEY_ENCODE_SET).to_string()
    }
}

fn append_part(out: &mut String, part: &Value) {
    match part {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        // Objects and arrays keep their full JSON serialization so that
        // structurally different parts never collapse to the same key.
        other => out.push_str(&other.to_string()),
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::Single(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey::Single(key)
    }
}

impl From<Vec<Value>> for CacheKey {
    fn from(parts: Vec<Value>) -> Self {
        CacheKey::Parts(parts)
    }
}

impl From<&[Value]> for CacheKey {
    fn from(parts: &[Value]) -> Self {
        CacheKey::Parts(parts.to_vec())
    }
}
