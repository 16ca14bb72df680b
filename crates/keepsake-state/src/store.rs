//! The reconciling state store.
//!
//! [`StateStore`] owns the single in-memory [`VersionedState`] for one logical
//! entity (a game save, a settings blob) and keeps two independent stored
//! copies of it: one in a preference store, one in a flat file replaced
//! atomically through [`DurableFile`]. Load reconciles the two copies;
//! save writes both.
//!
//! Collaborators (preference store, codec, clock) are injected at
//! construction. There is no service locator; a host wires a store per
//! entity and calls [`load`](StateStore::load) and [`save`](StateStore::save)
//! from its own lifecycle hooks, typically once at startup and once at
//! shutdown.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use keepsake_prefs::envelope::Prefs;

use crate::clock::Clock;
use crate::codec::{Codec, JsonCodec};
use crate::durable::DurableFile;
use crate::state::VersionedState;
use crate::StateError;

// ---------------------------------------------------------------------------
// CorruptPolicy
// ---------------------------------------------------------------------------

/// What [`StateStore::load`] does when no stored copy is readable.
///
/// Single-copy corruption is always recovered silently from the surviving
/// copy; this policy only applies when a canonical file exists but neither
/// copy decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Surface [`StateError::BothCopiesCorrupt`] and leave the stored copies
    /// untouched for inspection.
    #[default]
    Fail,

    /// Discard both copies, construct a default state, and persist it.
    ResetToDefault,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Static configuration for one [`StateStore`]: where the two copies live and
/// how they are written.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Preference store key of the key-value copy.
    pub prefs_key: String,
    /// Canonical save file path.
    pub canonical_path: PathBuf,
    /// Write-staging path; presence at startup signals an interrupted save.
    pub temp_path: PathBuf,
    /// Schema version this build writes. Stored states below it go through
    /// the migration hook on load.
    pub schema_version: u32,
    /// Seal stored copies with the preference store's cipher.
    pub encrypt: bool,
    /// Behavior when no stored copy is readable.
    pub corrupt_policy: CorruptPolicy,
}

impl StoreConfig {
    /// Configuration for a game save: `{name}.sav` plus the `"m_GameState"`
    /// preference key.
    pub fn save_state(save_dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = save_dir.as_ref();
        Self {
            prefs_key: "m_GameState".to_owned(),
            canonical_path: dir.join(format!("{name}.sav")),
            temp_path: dir.join(format!("{name}.sav.tmp")),
            schema_version: 0,
            encrypt: true,
            corrupt_policy: CorruptPolicy::default(),
        }
    }

    /// Configuration for a settings blob: `{name}_Settings.json` plus the
    /// `"m_SettingsState"` preference key.
    pub fn settings(save_dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = save_dir.as_ref();
        Self {
            prefs_key: "m_SettingsState".to_owned(),
            canonical_path: dir.join(format!("{name}_Settings.json")),
            temp_path: dir.join(format!("{name}_Settings.json.tmp")),
            schema_version: 0,
            encrypt: true,
            corrupt_policy: CorruptPolicy::default(),
        }
    }

    /// Store copies unsealed; the debug-build configuration, where save files
    /// stay readable and hand-editable.
    pub fn plaintext(mut self) -> Self {
        self.encrypt = false;
        self
    }

    /// Set the schema version this build writes.
    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Set the behavior for the no-readable-copy case.
    pub fn with_corrupt_policy(mut self, policy: CorruptPolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Migration hook: `(payload, stored_version, target_version)`.
pub type MigrateFn<P> = Box<dyn FnMut(&mut P, u32, u32)>;

/// Dual-copy persistence for one logical entity.
///
/// The cached state is lazily populated by the first access and never
/// invalidated; the store assumes it is the only writer of its paths and key
/// for the lifetime of the process.
pub struct StateStore<P> {
    config: StoreConfig,
    prefs: Prefs,
    file: DurableFile,
    codec: Box<dyn Codec<VersionedState<P>>>,
    clock: Box<dyn Clock>,
    migrate: Option<MigrateFn<P>>,
    state: Option<VersionedState<P>>,
}

impl<P: Default> StateStore<P> {
    /// Create a store with an explicit codec strategy.
    pub fn new(
        config: StoreConfig,
        prefs: Prefs,
        codec: Box<dyn Codec<VersionedState<P>>>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let file = DurableFile::new(&config.canonical_path, &config.temp_path);
        Self {
            config,
            prefs,
            file,
            codec,
            clock,
            migrate: None,
            state: None,
        }
    }

    /// Attach a migration hook, run on load when the stored schema version is
    /// below the configured one. Without a hook the version is raised
    /// silently.
    pub fn with_migration(mut self, migrate: impl FnMut(&mut P, u32, u32) + 'static) -> Self {
        self.migrate = Some(Box::new(migrate));
        self
    }

    /// This store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether the cached state has been populated.
    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// The current state, loading it on first access.
    pub fn state(&mut self) -> Result<&VersionedState<P>, StateError> {
        if self.state.is_none() {
            self.load()?;
        }
        Ok(self.state.as_ref().expect("load populates the cached state"))
    }

    /// Mutable access to the current state, loading it on first access.
    /// Mutations become durable on the next [`save`](Self::save).
    pub fn state_mut(&mut self) -> Result<&mut VersionedState<P>, StateError> {
        if self.state.is_none() {
            self.load()?;
        }
        Ok(self.state.as_mut().expect("load populates the cached state"))
    }

    /// Load and reconcile the stored copies.
    ///
    /// Order of operations:
    ///
    /// 1. Crash recovery: promote a leftover staging file, before any read.
    /// 2. Fresh install: no canonical file means a default state is
    ///    constructed, persisted, and returned.
    /// 3. Both copies are read and decoded. A copy that fails to unseal or
    ///    decode is treated as absent; the surviving copy is adopted without
    ///    a timestamp comparison.
    /// 4. With both copies readable, the one with the greater `last_modified`
    ///    wins. The preference copy must be strictly newer; ties go to the
    ///    file copy. Byte-identical raw copies skip the comparison.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::BothCopiesCorrupt`] when no copy is readable and
    /// the policy is [`CorruptPolicy::Fail`]; I/O errors propagate as
    /// [`StateError::Io`].
    pub fn load(&mut self) -> Result<&VersionedState<P>, StateError> {
        self.file.recover()?;

        let Some(file_raw) = self.file.read()? else {
            tracing::debug!(
                key = %self.config.prefs_key,
                path = %self.config.canonical_path.display(),
                "no canonical save file; starting fresh"
            );
            return self.adopt_fresh();
        };

        let prefs_raw: Option<String> = match self.prefs.try_get(&self.config.prefs_key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    key = %self.config.prefs_key,
                    error = %e,
                    "preference copy unreadable; treating as absent"
                );
                None
            }
        };

        let file_state = self.decode_copy(&file_raw, "file");
        let prefs_state = prefs_raw
            .as_deref()
            .and_then(|raw| self.decode_copy(raw, "prefs"));

        let adopted = match (prefs_state, file_state) {
            (Some(pp), Some(sav)) => {
                if prefs_raw.as_deref() == Some(file_raw.as_str()) {
                    // Identical raw copies; nothing to reconcile.
                    pp
                } else if pp.last_modified > sav.last_modified {
                    tracing::debug!(
                        key = %self.config.prefs_key,
                        prefs_ticks = pp.last_modified,
                        file_ticks = sav.last_modified,
                        "copies diverge; adopting newer preference copy"
                    );
                    pp
                } else {
                    tracing::debug!(
                        key = %self.config.prefs_key,
                        prefs_ticks = pp.last_modified,
                        file_ticks = sav.last_modified,
                        "copies diverge; adopting file copy"
                    );
                    sav
                }
            }
            (Some(pp), None) => {
                tracing::warn!(
                    key = %self.config.prefs_key,
                    "file copy unreadable; adopting preference copy"
                );
                pp
            }
            (None, Some(sav)) => sav,
            (None, None) => return self.handle_no_readable_copy(),
        };

        self.state = Some(adopted);
        self.run_migration();
        Ok(self.state.as_ref().expect("state populated above"))
    }

    /// Stamp, encode, and write the current state to both stores.
    ///
    /// The preference copy is written first, then the file copy through the
    /// staged-write protocol. No retries: an I/O failure propagates to the
    /// caller, which is usually a shutdown hook with nothing left to do about
    /// it.
    pub fn save(&mut self) -> Result<(), StateError> {
        if self.state.is_none() {
            self.load()?;
        }

        self.state
            .as_mut()
            .expect("load populates the cached state")
            .stamp(self.clock.as_ref());

        let state = self.state.as_ref().expect("load populates the cached state");
        let serialized = self.codec.encode(state).map_err(|e| StateError::Encode {
            key: self.config.prefs_key.clone(),
            source: e,
        })?;

        let sealed = if self.config.encrypt {
            self.prefs.cipher().encrypt(&serialized)
        } else {
            serialized
        };

        self.prefs.set(&self.config.prefs_key, &sealed, false)?;
        self.prefs.flush()?;
        self.file.write(&sealed)?;

        tracing::debug!(
            key = %self.config.prefs_key,
            path = %self.config.canonical_path.display(),
            bytes = sealed.len(),
            "saved state to both stores"
        );
        Ok(())
    }

    // -- internal helpers ---------------------------------------------------

    /// Construct, persist, and adopt a default state.
    fn adopt_fresh(&mut self) -> Result<&VersionedState<P>, StateError> {
        self.state = Some(VersionedState::fresh(self.config.schema_version));
        self.save()?;
        Ok(self.state.as_ref().expect("state populated above"))
    }

    /// A canonical file exists but neither copy decodes.
    fn handle_no_readable_copy(&mut self) -> Result<&VersionedState<P>, StateError> {
        match self.config.corrupt_policy {
            CorruptPolicy::Fail => Err(StateError::BothCopiesCorrupt {
                key: self.config.prefs_key.clone(),
            }),
            CorruptPolicy::ResetToDefault => {
                tracing::warn!(
                    key = %self.config.prefs_key,
                    "no stored copy is readable; resetting to defaults"
                );
                self.adopt_fresh()
            }
        }
    }

    /// Unseal and decode one stored copy. Any failure demotes the copy to
    /// "absent" with a warning; the caller decides whether a survivor exists.
    fn decode_copy(&self, raw: &str, which: &'static str) -> Option<VersionedState<P>> {
        let unsealed = if self.config.encrypt {
            match self.prefs.cipher().decrypt(raw) {
                Ok(plain) => plain,
                Err(e) => {
                    tracing::warn!(
                        key = %self.config.prefs_key,
                        copy = which,
                        error = %e,
                        "stored copy failed to unseal; treating as absent"
                    );
                    return None;
                }
            }
        } else {
            raw.to_owned()
        };

        match self.codec.decode(&unsealed) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(
                    key = %self.config.prefs_key,
                    copy = which,
                    error = %e,
                    "stored copy failed to decode; treating as absent"
                );
                None
            }
        }
    }

    /// Raise the schema version of a freshly loaded state, running the
    /// migration hook if one is attached.
    fn run_migration(&mut self) {
        let target = self.config.schema_version;
        let Some(state) = self.state.as_mut() else {
            return;
        };

        if state.schema_version < target {
            let old = state.schema_version;
            if let Some(migrate) = self.migrate.as_mut() {
                migrate(&mut state.payload, old, target);
            }
            state.schema_version = target;
            tracing::debug!(
                key = %self.config.prefs_key,
                from = old,
                to = target,
                "upgraded state schema"
            );
        } else if state.schema_version > target {
            tracing::warn!(
                key = %self.config.prefs_key,
                stored = state.schema_version,
                configured = target,
                "stored schema is newer than this build; leaving it untouched"
            );
        }
    }
}

impl<P: Serialize + DeserializeOwned + Default + 'static> StateStore<P> {
    /// Create a store using the JSON codec.
    pub fn json(config: StoreConfig, prefs: Prefs, clock: Box<dyn Clock>) -> Self {
        Self::new(config, prefs, Box::new(JsonCodec), clock)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
