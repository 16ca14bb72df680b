//! Keepsake Prefs -- key-value preference store with optional value obfuscation.
//!
//! This crate provides the preference-store half of the Keepsake persistence
//! stack: a small string-keyed store modeled on per-user OS preference
//! registries, with typed access through a JSON envelope and an optional
//! symmetric cipher applied to stored values.
//!
//! # Quick Start
//!
//! ```
//! use keepsake_prefs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Volume { master: f32, music: f32 }
//!
//! let backend = MemoryBackend::new();
//! let cipher = KeystreamCipher::new(b"example-project-key", b"example-iv");
//! let mut prefs = Prefs::new(Box::new(backend), Box::new(cipher));
//!
//! prefs.set("volume", &Volume { master: 0.8, music: 0.5 }, true).unwrap();
//!
//! let loaded: Volume = prefs.get("volume", Volume { master: 1.0, music: 1.0 });
//! assert_eq!(loaded, Volume { master: 0.8, music: 0.5 });
//! ```
//!
//! # Modules
//!
//! - [`store`]: the [`PrefsBackend`](store::PrefsBackend) seam plus in-memory
//!   and file-backed implementations.
//! - [`cipher`]: the [`Cipher`](cipher::Cipher) seam. The provided
//!   [`KeystreamCipher`](cipher::KeystreamCipher) is obfuscation against casual
//!   save editing, not a security boundary.
//! - [`envelope`]: typed get/set over a backend through a
//!   `{ encrypted, data }` JSON envelope.

#![deny(unsafe_code)]

pub mod cipher;
pub mod envelope;
pub mod store;

use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by preference store operations.
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    /// A filesystem operation on the backing store failed.
    #[error("prefs i/o failure at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing prefs document could not be parsed.
    #[error("malformed prefs document at '{path}': {details}")]
    MalformedDocument { path: PathBuf, details: String },

    /// A stored entry could not be decoded into the requested type.
    #[error("malformed prefs entry for key '{key}': {details}")]
    MalformedEntry { key: String, details: String },

    /// Decryption of a stored value failed.
    #[error(transparent)]
    Cipher(#[from] cipher::CipherError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::cipher::{Cipher, CipherError, KeystreamCipher, Passthrough};
    pub use crate::envelope::Prefs;
    pub use crate::store::{FileBackend, MemoryBackend, PrefsBackend};
    pub use crate::PrefsError;
}
