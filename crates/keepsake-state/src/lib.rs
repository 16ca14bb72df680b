//! Keepsake State -- dual-copy save-state persistence with reconciliation.
//!
//! Game save-state and settings-state are each written to two independent
//! places on every save: a key-value preference store (via `keepsake-prefs`)
//! and a flat file replaced through a write-temp-then-promote protocol. On
//! load, the [`StateStore`](store::StateStore) reads both copies, tolerates
//! either one being corrupt, and adopts whichever carries the later logical
//! timestamp. Either write path can fail independently without losing the
//! player's progress.
//!
//! # Quick Start
//!
//! ```
//! use keepsake_prefs::prelude::*;
//! use keepsake_state::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
//! struct SaveData { coins: u64, level: u32 }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let prefs = Prefs::new(Box::new(MemoryBackend::new()), Box::new(Passthrough));
//! let config = StoreConfig::save_state(dir.path(), "demo").plaintext();
//!
//! let mut store: StateStore<SaveData> =
//!     StateStore::json(config, prefs, Box::new(SystemClock));
//!
//! store.state_mut().unwrap().payload.coins = 75;
//! store.save().unwrap();
//! ```
//!
//! # Modules
//!
//! - [`state`]: the versioned state container (schema version, last-modified
//!   stamp, payload).
//! - [`clock`]: the logical clock seam used for timestamp stamping.
//! - [`codec`]: the serialization strategy seam; [`JsonCodec`](codec::JsonCodec)
//!   is the provided strategy.
//! - [`durable`]: atomic file replacement with crash recovery.
//! - [`store`]: the reconciling state store tying the above together.

#![deny(unsafe_code)]

pub mod clock;
pub mod codec;
pub mod durable;
pub mod state;
pub mod store;

use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by state persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// A filesystem operation on the save file failed. Saves issue no retries;
    /// a failure here typically surfaces from a shutdown hook where the
    /// process is already terminating.
    #[error("save file i/o failure at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The preference store half of the dual write failed.
    #[error(transparent)]
    Prefs(#[from] keepsake_prefs::PrefsError),

    /// The in-memory state could not be encoded for writing.
    #[error("failed to encode state for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: codec::CodecError,
    },

    /// Neither stored copy could be decoded and the store is configured to
    /// fail rather than reset. Single-copy corruption never raises this; it
    /// is silently recovered from the surviving copy.
    #[error("both stored copies under '{key}' are unreadable")]
    BothCopiesCorrupt { key: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::codec::{Codec, CodecError, JsonCodec};
    pub use crate::durable::DurableFile;
    pub use crate::state::VersionedState;
    pub use crate::store::{CorruptPolicy, StateStore, StoreConfig};
    pub use crate::StateError;
}
