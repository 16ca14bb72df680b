//! Typed preference access through a JSON envelope.
//!
//! Every stored value is wrapped in an envelope recording whether the payload
//! was sealed: `{ "encrypted": bool, "data": "<json or sealed json>" }`. The
//! envelope itself is always plain JSON, so a reader can tell how to unwrap a
//! value without guessing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cipher::Cipher;
use crate::store::PrefsBackend;
use crate::PrefsError;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// On-store wrapper for a single preference value.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    encrypted: bool,
    data: String,
}

// ---------------------------------------------------------------------------
// Prefs
// ---------------------------------------------------------------------------

/// Typed preference store: a backend plus a cipher for sealed values.
///
/// Collaborators are injected at construction; there is no global registry to
/// look them up from.
pub struct Prefs {
    backend: Box<dyn PrefsBackend>,
    cipher: Box<dyn Cipher>,
}

impl Prefs {
    /// Create a store over the given backend and cipher.
    pub fn new(backend: Box<dyn PrefsBackend>, cipher: Box<dyn Cipher>) -> Self {
        Self { backend, cipher }
    }

    /// The cipher this store seals values with.
    pub fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    /// The raw envelope string stored under `key`, if any.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.backend.get_string(key)
    }

    /// Fetch and decode the value under `key`, falling back to `default` on a
    /// missing key or any decode failure.
    ///
    /// This is the lenient read path for ordinary preferences. Callers that
    /// must distinguish "absent" from "corrupt" use [`try_get`](Self::try_get).
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "unreadable prefs entry; using default");
                default
            }
        }
    }

    /// Fetch and decode the value under `key`.
    ///
    /// Returns `Ok(None)` for a missing key.
    ///
    /// # Errors
    ///
    /// Returns [`PrefsError::MalformedEntry`] if the envelope or payload does
    /// not parse, or [`PrefsError::Cipher`] if a sealed payload fails to
    /// unseal.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PrefsError> {
        let Some(raw) = self.backend.get_string(key) else {
            return Ok(None);
        };

        let envelope: Envelope =
            serde_json::from_str(&raw).map_err(|e| PrefsError::MalformedEntry {
                key: key.to_owned(),
                details: format!("envelope: {e}"),
            })?;

        let inner = if envelope.encrypted {
            self.cipher.decrypt(&envelope.data)?
        } else {
            envelope.data
        };

        let value = serde_json::from_str(&inner).map_err(|e| PrefsError::MalformedEntry {
            key: key.to_owned(),
            details: format!("payload: {e}"),
        })?;

        Ok(Some(value))
    }

    /// Encode `value` and store it under `key`, sealing the payload when
    /// `encrypted` is set.
    ///
    /// # Errors
    ///
    /// Returns [`PrefsError::MalformedEntry`] if the value fails to encode.
    pub fn set<T: Serialize>(
        &mut self,
        key: &str,
        value: &T,
        encrypted: bool,
    ) -> Result<(), PrefsError> {
        let inner = serde_json::to_string(value).map_err(|e| PrefsError::MalformedEntry {
            key: key.to_owned(),
            details: format!("encode: {e}"),
        })?;

        let envelope = Envelope {
            encrypted,
            data: if encrypted {
                self.cipher.encrypt(&inner)
            } else {
                inner
            },
        };

        let raw = serde_json::to_string(&envelope).expect("envelope serialization is infallible");
        self.backend.set_string(key, &raw);
        Ok(())
    }

    /// Remove the entry under `key`.
    pub fn delete(&mut self, key: &str) {
        self.backend.delete(key);
    }

    /// Remove every entry.
    pub fn delete_all(&mut self) {
        self.backend.delete_all();
    }

    /// Persist pending writes to the backend's durable storage.
    pub fn flush(&mut self) -> Result<(), PrefsError> {
        self.backend.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
