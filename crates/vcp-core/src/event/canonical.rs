//! Canonical JSON serialization.
//!
//! Produces compact UTF-8 JSON with object keys sorted by Unicode code point at
//! every nesting level. This is the sole input to every hash in vcp: the same
//! logical value must always produce the same byte sequence, regardless of the
//! order in which its mapping keys were inserted.
//!
//! Rules:
//! - Compact: no whitespace between tokens, no byte-order mark.
//! - Object keys sorted by code point (recursive at every depth).
//! - Arrays preserve element order.
//! - Integers, strings, booleans, and null serialized normally.
//! - Native floating-point numbers are rejected with
//!   [`CanonicalError::InvalidValueType`]. Financial values must already be
//!   decimal strings (see [`crate::event::decimal::Decimal`]).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::ErrorCode;

/// Errors that can occur during canonicalization.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    /// A value that has no canonical form was found (native float).
    #[error("non-canonicalizable {found} at {path}")]
    InvalidValueType {
        /// JSON path of the offending value, rooted at `$`.
        path: String,
        /// What was found there.
        found: &'static str,
    },

    /// A blob claimed to be canonical but re-canonicalizes differently.
    #[error("blob is not in canonical form")]
    NotCanonical,

    /// Input text was not valid JSON, or a model failed to serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CanonicalError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidValueType { .. } | Self::NotCanonical | Self::Json(_) => {
                ErrorCode::InvalidValueType
            }
        }
    }
}

/// Produce canonical bytes from a [`serde_json::Value`].
///
/// # Errors
///
/// Returns [`CanonicalError::InvalidValueType`] if any embedded number is a
/// native float.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vcp_core::event::canonical::canonicalize;
///
/// let val = json!({"z": 1, "a": {"c": "3.10", "b": 2}});
/// let bytes = canonicalize(&val).unwrap();
/// assert_eq!(bytes, br#"{"a":{"b":2,"c":"3.10"},"z":1}"#);
/// ```
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut buf = Vec::with_capacity(128);
    let mut path = String::from("$");
    write_canonical(value, &mut buf, &mut path)?;
    Ok(buf)
}

/// Canonicalize any serializable model.
///
/// # Errors
///
/// Returns [`CanonicalError::Json`] if the model cannot be represented as
/// JSON, or [`CanonicalError::InvalidValueType`] if it contains a float.
pub fn canonicalize_serialize<T: Serialize + ?Sized>(model: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(model)?;
    canonicalize(&value)
}

/// Produce canonical JSON text from a JSON string.
///
/// # Errors
///
/// Returns [`CanonicalError::Json`] if the input is not valid JSON, or
/// [`CanonicalError::InvalidValueType`] if it contains a float.
pub fn canonicalize_str(json: &str) -> Result<String, CanonicalError> {
    let value: Value = serde_json::from_str(json)?;
    let bytes = canonicalize(&value)?;
    // Output is built exclusively from serde_json string escapes and ASCII
    // punctuation, so it is always valid UTF-8.
    String::from_utf8(bytes).map_err(|_| CanonicalError::NotCanonical)
}

fn write_canonical(
    value: &Value,
    buf: &mut Vec<u8>,
    path: &mut String,
) -> Result<(), CanonicalError> {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(true) => buf.extend_from_slice(b"true"),
        Value::Bool(false) => buf.extend_from_slice(b"false"),
        Value::Number(n) => write_number(n, buf, path)?,
        Value::String(s) => serde_json::to_writer(&mut *buf, s)?,
        Value::Array(arr) => {
            buf.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                let mark = path.len();
                path.push_str(&format!("[{i}]"));
                write_canonical(item, buf, path)?;
                path.truncate(mark);
            }
            buf.push(b']');
        }
        Value::Object(map) => {
            // `str` ordering is byte ordering of UTF-8, which is code point order.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

            buf.push(b'{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                serde_json::to_writer(&mut *buf, key)?;
                buf.push(b':');
                let mark = path.len();
                path.push('.');
                path.push_str(key);
                write_canonical(val, buf, path)?;
                path.truncate(mark);
            }
            buf.push(b'}');
        }
    }
    Ok(())
}

fn write_number(n: &Number, buf: &mut Vec<u8>, path: &str) -> Result<(), CanonicalError> {
    if let Some(i) = n.as_i64() {
        buf.extend_from_slice(i.to_string().as_bytes());
    } else if let Some(u) = n.as_u64() {
        buf.extend_from_slice(u.to_string().as_bytes());
    } else {
        return Err(CanonicalError::InvalidValueType {
            path: path.to_owned(),
            found: "floating-point number",
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CanonicalBlob
// ---------------------------------------------------------------------------

/// A JSON document held in its canonical byte form.
///
/// Used for payload extensions the typed model does not know about: the blob
/// is hashed verbatim, so it must already be canonical. Construction enforces
/// that.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBlob(String);

impl CanonicalBlob {
    /// Canonicalize `value` into a blob.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::InvalidValueType`] for embedded floats.
    pub fn from_value(value: &Value) -> Result<Self, CanonicalError> {
        let bytes = canonicalize(value)?;
        String::from_utf8(bytes)
            .map(Self)
            .map_err(|_| CanonicalError::NotCanonical)
    }

    /// Accept text that is claimed to already be canonical.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::NotCanonical`] if re-canonicalizing the text
    /// changes a single byte.
    pub fn from_canonical(text: impl Into<String>) -> Result<Self, CanonicalError> {
        let text = text.into();
        if canonicalize_str(&text)? == text {
            Ok(Self(text))
        } else {
            Err(CanonicalError::NotCanonical)
        }
    }

    /// The canonical bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The canonical text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the blob back into a JSON value.
    ///
    /// # Errors
    ///
    /// Only fails if the blob was corrupted in memory, which construction
    /// rules out.
    pub fn to_value(&self) -> Result<Value, CanonicalError> {
        Ok(serde_json::from_str(&self.0)?)
    }
}

impl fmt::Debug for CanonicalBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalBlob({})", self.0)
    }
}

impl fmt::Display for CanonicalBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CanonicalBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.to_value().map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CanonicalBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
