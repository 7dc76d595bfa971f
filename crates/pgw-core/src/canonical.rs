//! # Canonical Serialization
//!
//! [`CanonicalBytes`] is the only construction path for bytes that get
//! signed (webhook `X-Signature`) or hashed (audit chain).
//!
//! ## Rules
//!
//! 1. Object keys are emitted in lexicographic byte order at every depth.
//! 2. Separators are compact (no whitespace between tokens).
//! 3. Arrays keep their order.
//! 4. Scalars use `serde_json`'s standard encoding.
//!
//! Key ordering is enforced by the writer itself rather than relying on the
//! `serde_json::Map` backing type, so enabling `preserve_order` anywhere in
//! the dependency graph cannot change a signature.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by canonical JSON serialization.
///
/// The inner `Vec<u8>` is private: downstream code cannot construct
/// `CanonicalBytes` except through [`CanonicalBytes::new()`] or
/// [`CanonicalBytes::from_value()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(&value)
    }

    /// Construct canonical bytes from an already-built JSON value.
    pub fn from_value(value: &Value) -> Result<Self, CanonicalizationError> {
        let mut out = Vec::new();
        write_canonical(value, &mut out)?;
        Ok(Self(out))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the inner byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// View the canonical form as text. Always valid UTF-8 since it is JSON.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalizationError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => {
            serde_json::to_writer(&mut *out, scalar)?;
        }
    }
    Ok(())
}
