//! Pipeline counters (§6.2): the atomic tallies the orchestrator exposes to
//! its external collaborators — tracks found, crates updated/skipped, paths
//! fixed, duplicates moved, tracks skipped as already-existing. Each field is
//! a plain `AtomicU64`, matching §5's "counters use atomic increments" and
//! requiring no locking discipline beyond that.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Counters {
    pub tracks_found: AtomicU64,
    pub crates_updated: AtomicU64,
    pub crates_skipped: AtomicU64,
    pub paths_fixed: AtomicU64,
    pub duplicates_moved: AtomicU64,
    /// Tracks the crate tree builder (component H) found already present in
    /// the index or an existing crate scan, per §4.J's "skipped existing"
    /// counter.
    pub skipped_existing: AtomicU64,
}

/// Plain-value snapshot of [`Counters`], for a final summary report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub tracks_found: u64,
    pub crates_updated: u64,
    pub crates_skipped: u64,
    pub paths_fixed: u64,
    pub duplicates_moved: u64,
    pub skipped_existing: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tracks_found(&self, n: u64) {
        self.tracks_found.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_crates_updated(&self) {
        self.crates_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_crates_skipped(&self) {
        self.crates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_paths_fixed(&self, n: u64) {
        self.paths_fixed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_duplicates_moved(&self, n: u64) {
        self.duplicates_moved.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_skipped_existing(&self, n: u64) {
        self.skipped_existing.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            tracks_found: self.tracks_found.load(Ordering::Relaxed),
            crates_updated: self.crates_updated.load(Ordering::Relaxed),
            crates_skipped: self.crates_skipped.load(Ordering::Relaxed),
            paths_fixed: self.paths_fixed.load(Ordering::Relaxed),
            duplicates_moved: self.duplicates_moved.load(Ordering::Relaxed),
            skipped_existing: self.skipped_existing.load(Ordering::Relaxed),
        }
    }
}
