//! Configuration collaborator (§6.3): the settings the orchestrator reads
//! before it runs. Loading these from a file or CLI flags is outside the
//! core's scope; this module only defines the shape the core consumes.

use std::path::PathBuf;

use crate::dupe_mover::{FingerprintMode, KeepPolicy};
use crate::track_index::DedupMode;

/// Duplicate-move policy, or disabled entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupeMovePolicy {
    Off,
    KeepNewest,
    KeepOldest,
}

impl DupeMovePolicy {
    pub fn as_keep_policy(&self) -> Option<KeepPolicy> {
        match self {
            DupeMovePolicy::Off => None,
            DupeMovePolicy::KeepNewest => Some(KeepPolicy::KeepNewest),
            DupeMovePolicy::KeepOldest => Some(KeepPolicy::KeepOldest),
        }
    }
}

/// Recognized settings from the configuration collaborator (§6.3).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub music_root: PathBuf,
    pub library: PathBuf,
    pub parent_crate_name: Vec<String>,
    pub backup: bool,
    pub backup_root: Option<PathBuf>,
    pub clear_before_sync: bool,
    /// Toggles component J (§6.3 `skip-existing?`); `dedup_mode` picks its
    /// matching strategy once this is on.
    pub skip_existing: bool,
    pub dedup_mode: DedupMode,
    pub fix_broken_paths: bool,
    pub sort: bool,
    pub dupe_scan: bool,
    pub dupe_detection: Option<FingerprintMode>,
    pub dupe_move: DupeMovePolicy,
    pub quarantine_root: Option<PathBuf>,
}

impl SyncConfig {
    /// A minimal config with every optional stage disabled, useful as a
    /// base for tests and for callers building config incrementally.
    pub fn minimal(music_root: PathBuf, library: PathBuf) -> Self {
        SyncConfig {
            music_root,
            library,
            parent_crate_name: Vec::new(),
            backup: false,
            backup_root: None,
            clear_before_sync: false,
            skip_existing: false,
            dedup_mode: DedupMode::Off,
            fix_broken_paths: false,
            sort: false,
            dupe_scan: false,
            dupe_detection: None,
            dupe_move: DupeMovePolicy::Off,
            quarantine_root: None,
        }
    }
}
