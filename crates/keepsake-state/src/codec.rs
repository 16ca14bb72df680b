//! Serialization strategy seam.
//!
//! The store is a single component parameterized by a [`Codec`], so a payload
//! shape is a type argument and a wire format is a strategy object rather than
//! a separate store type per payload.

use serde::de::DeserializeOwned;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by a codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The input could not be decoded. The reconciler treats this as "copy
    /// absent", not as a fatal error, as long as the other copy survives.
    #[error("decode failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Codec trait
// ---------------------------------------------------------------------------

/// A structured-object wire format.
///
/// `decode(encode(v)) == v` must hold, including for payloads with nested
/// collections. `decode` must error on malformed input rather than produce a
/// partial value.
pub trait Codec<T> {
    /// Encode a value to its string form.
    fn encode(&self, value: &T) -> Result<String, CodecError>;

    /// Decode a value from its string form.
    fn decode(&self, raw: &str) -> Result<T, CodecError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// Compact JSON via `serde_json`; the default save wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<T, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
