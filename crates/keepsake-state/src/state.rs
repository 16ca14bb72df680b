//! The versioned state container.

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

// ---------------------------------------------------------------------------
// VersionedState
// ---------------------------------------------------------------------------

/// A save payload plus the metadata the reconciliation protocol needs.
///
/// Exactly one instance per logical entity lives in memory, owned by its
/// [`StateStore`](crate::store::StateStore). Application code mutates
/// `payload` in place between load and save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedState<P> {
    /// Schema version of `payload`. Monotonically non-decreasing across saves
    /// of the same logical entity; raised by the store's migration step.
    pub schema_version: u32,

    /// Logical clock ticks (UTC) of the most recent save. The sole tie-break
    /// between the two stored copies.
    pub last_modified: i64,

    /// The actual save or settings data.
    pub payload: P,
}

impl<P: Default> VersionedState<P> {
    /// Construct a first-run state: default payload, never saved.
    pub fn fresh(schema_version: u32) -> Self {
        Self {
            schema_version,
            last_modified: 0,
            payload: P::default(),
        }
    }
}

impl<P> VersionedState<P> {
    /// Update `last_modified` from the clock. Called by the store on every
    /// save, immediately before serialization.
    pub fn stamp(&mut self, clock: &dyn Clock) {
        self.last_modified = clock.now_ticks();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
