//! Logical clock seam for last-modified stamping.
//!
//! Only the ordering of successive ticks matters to the reconciliation
//! protocol; the absolute value is never interpreted.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Clock trait
// ---------------------------------------------------------------------------

/// Source of logical tick values for [`VersionedState::last_modified`]
/// stamping.
///
/// [`VersionedState::last_modified`]: crate::state::VersionedState::last_modified
pub trait Clock {
    /// The current tick value. Successive calls must not decrease.
    fn now_ticks(&self) -> i64;
}

// ---------------------------------------------------------------------------
// SystemClock
// ---------------------------------------------------------------------------

/// Wall-clock ticks: 100 ns intervals since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ticks(&self) -> i64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (since_epoch.as_nanos() / 100) as i64
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// A settable clock for tests. Clones share the same underlying tick value,
/// so a test can keep a handle while the store owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a manual clock starting at the given tick.
    pub fn starting_at(ticks: i64) -> Self {
        Self {
            ticks: Arc::new(AtomicI64::new(ticks)),
        }
    }

    /// Set the current tick value.
    pub fn set(&self, ticks: i64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }

    /// Advance the clock by `delta` ticks.
    pub fn advance(&self, delta: i64) {
        self.ticks.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> i64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
