//! Pipeline orchestrator (component O): the fixed sequence described in
//! §4.O, driving every other component from a single [`config::SyncConfig`]
//! and a [`logger::Logger`] collaborator.
//!
//! Grounded on the teacher's `commands/device.rs` style of threading a
//! single `Fs` handle and `anyhow::Result` through a multi-step operation,
//! with `.context(...)` at each step boundary so a fatal failure surfaces
//! as a readable chain rather than a bare `io::Error`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::config::SyncConfig;
use crate::counters::{Counters, CountersSnapshot};
use crate::crate_codec::{self, Crate};
use crate::crate_fixer;
use crate::crate_tree::{self, CrateName};
use crate::dupe_mover;
use crate::index_codec::{self, Index};
use crate::index_repair::{self, PathFix};
use crate::io_prim::encode_utf16be;
use crate::logger::Logger;
use crate::path_norm;
use crate::scanner::{self, MediaNode};
use crate::sidebar;
use crate::smart_writer::{self, WriteOutcome};
use crate::track_index::TrackIndex;

const INDEX_FILE_NAME: &str = "database V2";

/// Run the full sync pipeline once, per §4.O's fixed sequence. Returns the
/// final counter snapshot on success; a fatal error (per §7) is returned as
/// `Err` after the driver has already reported it through `logger.fatal`.
pub fn run(config: &SyncConfig, logger: &dyn Logger) -> Result<CountersSnapshot> {
    let counters = Counters::new();

    // 1. Backup, if configured. Any failure here is fatal (§7: Inside N: fatal).
    if config.backup {
        let backup_root = config
            .backup_root
            .as_ref()
            .ok_or_else(|| anyhow!("backup enabled but no backup_root configured"))?;
        logger.progress("backup", 0, 1);
        let result = crate::backup::backup(&config.library, backup_root)
            .with_context(|| format!("backing up library '{}'", config.library.display()))
            .map_err(|e| {
                logger.fatal(&e.to_string());
                e
            })?;
        logger.info(&format!(
            "backed up {} bytes to {}",
            result.bytes_copied,
            result.dest.display()
        ));
        logger.progress("backup", 1, 1);
    }

    // 2. Scan the media tree. Abort if it's empty (§4.O step 2).
    logger.progress("scan", 0, 1);
    let mut tree = scanner::scan(&config.music_root);
    let total = tree.total_tracks() as u64;
    if total == 0 {
        let msg = format!(
            "no media files found under '{}'",
            config.music_root.display()
        );
        logger.fatal(&msg);
        return Err(anyhow!(msg));
    }
    logger.progress("scan", total, total);

    // 3. Duplicate-move, if enabled, then rescan (rescan invariant, §8 P8).
    if config.dupe_scan {
        if let (Some(mode), Some(policy)) = (
            config.dupe_detection,
            config.dupe_move.as_keep_policy(),
        ) {
            tree = run_dupe_move(config, &tree, mode, policy, &counters, logger)
                .context("duplicate-move stage")?;
        }
    }

    // Recorded after any dupe-move rescan so the counter reflects the tree
    // crates are actually built from (§8 P8: no crate references a moved
    // path).
    counters.add_tracks_found(tree.total_tracks() as u64);

    // 4. Ensure the library exists.
    if !config.library.exists() {
        let should_create = logger.confirm(&format!(
            "library '{}' does not exist — create it?",
            config.library.display()
        ));
        if !should_create {
            let msg = format!("library '{}' does not exist", config.library.display());
            logger.fatal(&msg);
            return Err(anyhow!(msg));
        }
        std::fs::create_dir_all(&config.library)
            .with_context(|| format!("creating library '{}'", config.library.display()))?;
    }

    let subcrates_dir = config.library.join("Subcrates");
    std::fs::create_dir_all(&subcrates_dir)
        .with_context(|| format!("creating '{}'", subcrates_dir.display()))?;

    // 5. Load the index, if present (§4.D; absence is not an error).
    let index_path = config.library.join(INDEX_FILE_NAME);
    let index: Option<Index> = load_index(&index_path)?;

    // 6. Validate the configured parent crate.
    let parent_name = CrateName::from_segments(config.parent_crate_name.clone())
        .map_err(|e| anyhow!("invalid parent crate name: {e}"))?;
    ensure_parent_crate(&subcrates_dir, &parent_name)?;

    // 7. Build the track index for dedup, if enabled (§6.3: `skip-existing?`
    // is J's toggle; `dedup_mode` selects its matching strategy).
    let existing_crates = read_existing_crates(&subcrates_dir);
    let shared_index = index.map(Arc::new);
    let track_index = if config.skip_existing && config.dedup_mode != crate::track_index::DedupMode::Off {
        Some(TrackIndex::new(
            config.dedup_mode,
            shared_index.clone(),
            &existing_crates,
        ))
    } else {
        None
    };

    // 8. Build the crate tree.
    let built = crate_tree::build(
        &tree,
        &parent_name,
        track_index.as_ref(),
        shared_index.clone(),
    )
    .map_err(|e| anyhow!("building crate tree: {e}"))?;

    let skipped_existing_total: u64 = built.iter().map(|bc| bc.skipped_existing as u64).sum();
    if track_index.is_some() {
        counters.add_skipped_existing(skipped_existing_total);
        logger.info(&format!(
            "{skipped_existing_total} track(s) already present in the index or an existing crate"
        ));
    }

    // 9. Clear-before-sync, if configured.
    if config.clear_before_sync {
        clear_library_crates(&config.library)?;
        if index_path.exists() {
            std::fs::remove_file(&index_path)
                .with_context(|| format!("removing '{}'", index_path.display()))?;
        }
        if config.fix_broken_paths {
            logger.info(
                "clear-before-sync removed the index; fix-broken-paths has nothing to repair \
                 this run (benign, per design notes)",
            );
        }
    }

    // 10. Smart-write every crate.
    logger.progress("write", 0, built.len() as u64);
    for (i, bc) in built.iter().enumerate() {
        let target = subcrates_dir.join(bc.name.file_name());
        let outcome = smart_writer::smart_write(&target, &bc.data)
            .with_context(|| format!("writing crate '{}'", target.display()))?;
        match outcome {
            WriteOutcome::Updated => counters.inc_crates_updated(),
            WriteOutcome::Skipped => counters.inc_crates_skipped(),
        }
        logger.progress("write", (i + 1) as u64, built.len() as u64);
    }

    // 11. Crate-path fixer, if enabled. May mutate both crates and the index.
    if config.fix_broken_paths && !config.clear_before_sync {
        run_path_fixer(config, &tree, &subcrates_dir, &index_path, &counters, logger)
            .context("crate-path-fixer stage")?;
    }

    // 12. Sidebar-order emitter, if enabled.
    if config.sort {
        sidebar::write_sidebar_order(&config.library)
            .with_context(|| format!("writing sidebar order for '{}'", config.library.display()))?;
    }

    Ok(counters.snapshot())
}

fn load_index(index_path: &Path) -> Result<Option<Index>> {
    match std::fs::read(index_path) {
        Ok(bytes) => {
            let idx = index_codec::parse(&bytes)
                .with_context(|| format!("parsing index '{}'", index_path.display()))?;
            Ok(Some(idx))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading index '{}'", index_path.display())),
    }
}

/// Reject `%%` in the parent name's segments (already enforced by
/// `CrateName::from_segments`); create a stub crate file if the parent
/// crate doesn't exist yet; fatal if more than one case-insensitive match
/// exists (§4.O step 6).
fn ensure_parent_crate(subcrates_dir: &Path, parent_name: &CrateName) -> Result<()> {
    if parent_name.depth() == 0 {
        return Ok(());
    }
    let target_name = parent_name.file_name();
    let target_lower = target_name.to_lowercase();

    let matches: Vec<PathBuf> = std::fs::read_dir(subcrates_dir)
        .with_context(|| format!("reading '{}'", subcrates_dir.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_lowercase() == target_lower)
                .unwrap_or(false)
        })
        .collect();

    match matches.len() {
        0 => {
            let stub = Crate::new();
            let bytes = crate_codec::write(&stub);
            std::fs::write(subcrates_dir.join(&target_name), bytes)
                .with_context(|| format!("creating stub crate '{target_name}'"))?;
            Ok(())
        }
        1 => Ok(()),
        _ => Err(anyhow!(
            "more than one crate file matches parent crate name '{target_name}' case-insensitively"
        )),
    }
}

fn read_existing_crates(subcrates_dir: &Path) -> Vec<Crate> {
    let Ok(entries) = std::fs::read_dir(subcrates_dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("crate"))
        .filter_map(|p| std::fs::read(&p).ok())
        .filter_map(|bytes| crate_codec::parse(&bytes).ok())
        .collect()
}

fn clear_library_crates(library: &Path) -> Result<()> {
    for dir_name in ["Crates", "Subcrates"] {
        let dir = library.join(dir_name);
        if !dir.exists() {
            continue;
        }
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("reading '{}'", dir.display()))?
            .flatten()
        {
            let path = entry.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            }
            .with_context(|| format!("removing '{}'", path.display()))?;
        }
    }
    Ok(())
}

fn run_dupe_move(
    config: &SyncConfig,
    tree: &MediaNode,
    mode: dupe_mover::FingerprintMode,
    policy: dupe_mover::KeepPolicy,
    counters: &Counters,
    logger: &dyn Logger,
) -> Result<MediaNode> {
    let quarantine_base = config
        .quarantine_root
        .clone()
        .unwrap_or_else(|| config.library.with_file_name("quarantine"));
    let timestamp = chrono::Local::now().format("%Y%m%dT%H%M%S").to_string();
    let quarantine_dir = quarantine_base.join(&timestamp);

    let result = dupe_mover::move_duplicates(
        tree,
        &config.music_root,
        &quarantine_dir,
        mode,
        policy,
    );
    dupe_mover::write_dupes_log(&quarantine_base, &result.moved)
        .context("writing dupes.log")?;
    counters.add_duplicates_moved(result.moved.len() as u64);
    logger.info(&format!(
        "moved {} duplicate file(s) to {}",
        result.moved.len(),
        quarantine_dir.display()
    ));

    if !result.moved.is_empty() {
        let index_path = config.library.join(INDEX_FILE_NAME);
        if let Ok(raw) = std::fs::read(&index_path) {
            if let Ok(parsed) = index_codec::parse(&raw) {
                let fixes = build_moved_path_fixes(&parsed, &result.moved, &config.music_root);
                if !fixes.is_empty() {
                    let (new_bytes, applied) = index_repair::apply_fixes(&raw, &fixes);
                    if applied > 0 {
                        atomic_write(&index_path, &new_bytes)
                            .context("writing repaired index after duplicate move")?;
                    }
                }
            }
        }
    }

    Ok(scanner::scan(&config.music_root))
}

/// Translate a duplicate-mover's `(original -> kept)` map into `PathFix`es
/// against the index, by filename lookup (the mover doesn't carry the
/// index's recorded size, so an exact-size match can't be required here).
fn build_moved_path_fixes(
    index: &Index,
    moved: &std::collections::HashMap<PathBuf, PathBuf>,
    volume_root: &Path,
) -> Vec<PathFix> {
    let mut fixes = Vec::new();
    for (original, kept) in moved {
        let original_str = original.to_string_lossy();
        let Some(track) = index
            .find_by_path_ignoring_size(&original_str)
            .or_else(|| index.find_by_filename_ignoring_size(&original_str))
        else {
            continue;
        };
        let kept_relative = kept
            .strip_prefix(volume_root)
            .unwrap_or(kept)
            .to_string_lossy();
        let new_bytes = encode_utf16be(&path_norm::canonical(&kept_relative));
        fixes.push(PathFix::new(track.pfil_bytes.clone(), new_bytes));
    }
    fixes
}

fn run_path_fixer(
    config: &SyncConfig,
    tree: &MediaNode,
    subcrates_dir: &Path,
    index_path: &Path,
    counters: &Counters,
    logger: &dyn Logger,
) -> Result<()> {
    let index = load_index(index_path)?;
    let result = crate_fixer::fix_crates(subcrates_dir, tree, index.as_ref(), &config.music_root)
        .with_context(|| format!("scanning crates under '{}'", subcrates_dir.display()))?;

    if !result.path_fixes.is_empty() {
        if let Ok(raw) = std::fs::read(index_path) {
            let (new_bytes, applied) = index_repair::apply_fixes(&raw, &result.path_fixes);
            if applied > 0 {
                atomic_write(index_path, &new_bytes).context("writing repaired index")?;
                counters.add_paths_fixed(applied as u64);
            }
        }
    }

    for dirty in &result.dirty {
        crate_fixer::write_dirty(dirty)
            .with_context(|| format!("writing fixed crate '{}'", dirty.path.display()))?;
    }

    logger.info(&format!(
        "rebound {} crate(s), queued {} index path fix(es)",
        result.rebound_count,
        result.path_fixes.len()
    ));
    Ok(())
}

/// Write `bytes` to `path` via a write-then-rename, so a crash mid-write
/// never leaves a half-written index on disk (§7: "Inside E's final write:
/// fatal ... if an atomic replace is available, use it").
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp-write");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
