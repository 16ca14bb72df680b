//! Atomic file replacement with crash recovery.
//!
//! A save is never written over the canonical file directly. The payload goes
//! to a staging file first, then the canonical file is deleted and the staging
//! file renamed into its place. A crash while staging leaves the old canonical
//! file intact; a leftover staging file at startup marks a crash after staging
//! completed, and [`DurableFile::recover`] finishes the promotion the crashed
//! process never got to.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::StateError;

// ---------------------------------------------------------------------------
// DurableFile
// ---------------------------------------------------------------------------

/// A canonical file plus its write-staging sibling.
#[derive(Debug, Clone)]
pub struct DurableFile {
    canonical: PathBuf,
    temp: PathBuf,
}

impl DurableFile {
    /// Create a durable file over the given canonical and staging paths.
    /// Both should live in the same directory so the promotion rename stays
    /// within one filesystem.
    pub fn new(canonical: impl Into<PathBuf>, temp: impl Into<PathBuf>) -> Self {
        Self {
            canonical: canonical.into(),
            temp: temp.into(),
        }
    }

    /// The canonical path.
    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    /// Replace the canonical file with `contents`.
    ///
    /// Stages the full contents first, deletes any existing canonical file,
    /// then renames the staging file into place. The only unsafe window is
    /// between the delete and the rename, a single filesystem rename wide.
    pub fn write(&self, contents: &str) -> Result<(), StateError> {
        if let Some(parent) = self.canonical.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StateError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        fs::write(&self.temp, contents).map_err(|e| StateError::Io {
            path: self.temp.clone(),
            source: e,
        })?;

        if self.canonical.exists() {
            fs::remove_file(&self.canonical).map_err(|e| StateError::Io {
                path: self.canonical.clone(),
                source: e,
            })?;
        }

        fs::rename(&self.temp, &self.canonical).map_err(|e| StateError::Io {
            path: self.canonical.clone(),
            source: e,
        })
    }

    /// Finish a promotion interrupted by a crash.
    ///
    /// If the staging file exists, the canonical file (if any) is deleted and
    /// the staging file renamed into its place. A fully staged file is
    /// trusted over a canonical file of unknown freshness; there is no
    /// integrity check before promoting. Returns whether a promotion happened.
    ///
    /// Must run before any read of the canonical file.
    pub fn recover(&self) -> Result<bool, StateError> {
        if !self.temp.exists() {
            return Ok(false);
        }

        if self.canonical.exists() {
            fs::remove_file(&self.canonical).map_err(|e| StateError::Io {
                path: self.canonical.clone(),
                source: e,
            })?;
        }

        fs::rename(&self.temp, &self.canonical).map_err(|e| StateError::Io {
            path: self.canonical.clone(),
            source: e,
        })?;

        tracing::warn!(
            path = %self.canonical.display(),
            "promoted leftover staging file from an interrupted save"
        );
        Ok(true)
    }

    /// Read the canonical file. Returns `None` if it does not exist.
    pub fn read(&self) -> Result<Option<String>, StateError> {
        match fs::read_to_string(&self.canonical) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::Io {
                path: self.canonical.clone(),
                source: e,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
