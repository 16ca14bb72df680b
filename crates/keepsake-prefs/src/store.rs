//! Preference store backends.
//!
//! [`PrefsBackend`] is the seam over whatever actually holds the key-value
//! pairs. [`MemoryBackend`] keeps them in a map; [`FileBackend`] persists the
//! whole map as a single JSON document, standing in for a per-user OS
//! preference registry.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::PrefsError;

// ---------------------------------------------------------------------------
// PrefsBackend trait
// ---------------------------------------------------------------------------

/// Raw string-keyed storage for preference values.
///
/// Backends store opaque strings; typed access and optional value sealing
/// live one layer up in [`Prefs`](crate::envelope::Prefs).
pub trait PrefsBackend {
    /// Fetch the raw string stored under `key`, if any.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Store a raw string under `key`, replacing any previous value.
    fn set_string(&mut self, key: &str, value: &str);

    /// Remove the entry under `key`. Removing a missing key is a no-op.
    fn delete(&mut self, key: &str);

    /// Remove every entry.
    fn delete_all(&mut self);

    /// Persist pending writes to durable storage, if the backend has any.
    fn flush(&mut self) -> Result<(), PrefsError>;
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// Ephemeral in-memory backend. Used in tests and for platforms where the
/// preference half of the dual-write protocol is unavailable.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrefsBackend for MemoryBackend {
    fn get_string(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn delete_all(&mut self) {
        self.entries.clear();
    }

    fn flush(&mut self) -> Result<(), PrefsError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileBackend
// ---------------------------------------------------------------------------

/// File-backed backend: the full key-value map as one JSON document.
///
/// The document is read once at [`open`](Self::open); writes mutate the
/// in-memory map and reach disk on [`flush`](PrefsBackend::flush). Keys are
/// kept in a `BTreeMap` so the document serializes in a stable order.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileBackend {
    /// Open (or create) a file-backed store at `path`.
    ///
    /// A missing file is an empty store; the file is not created until the
    /// first flush.
    ///
    /// # Errors
    ///
    /// Returns [`PrefsError::MalformedDocument`] if the file exists but does
    /// not parse as a JSON string map, and [`PrefsError::Io`] if it cannot be
    /// read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PrefsError> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read_to_string(&path) {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|e| PrefsError::MalformedDocument {
                    path: path.clone(),
                    details: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(PrefsError::Io { path, source: e }),
        };

        Ok(Self { path, entries })
    }

    /// The path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PrefsBackend for FileBackend {
    fn get_string(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn delete_all(&mut self) {
        self.entries.clear();
    }

    fn flush(&mut self) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PrefsError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let doc = serde_json::to_string(&self.entries).expect("string map serialization is infallible");
        fs::write(&self.path, doc).map_err(|e| PrefsError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "flushed prefs document");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
