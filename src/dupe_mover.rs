//! Duplicate mover (component L): group scanned tracks by fingerprint and
//! quarantine every copy except the one the configured policy keeps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::path_norm;
use crate::scanner::MediaNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintMode {
    NameOnly,
    NameAndSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepPolicy {
    KeepNewest,
    KeepOldest,
}

/// Dedup key for one track (§3): NFC-lowercased leaf filename, optionally
/// concatenated with `|` and the file's size in bytes.
pub fn fingerprint(path: &Path, mode: FingerprintMode) -> String {
    let leaf = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(path_norm::nfc_lower_filename)
        .unwrap_or_default();
    match mode {
        FingerprintMode::NameOnly => leaf,
        FingerprintMode::NameAndSize => {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            format!("{leaf}|{size}")
        }
    }
}

/// `(original absolute path) -> (kept absolute path)`, for every file moved
/// into quarantine. Returned so the orchestrator can thread these into the
/// index via E (§4.L).
pub struct MoveResult {
    pub moved: HashMap<PathBuf, PathBuf>,
    pub bytes_attempted: usize,
}

/// Scan `tree`'s tracks, group by fingerprint, and quarantine every copy in
/// each group but the one `policy` keeps. `music_root` is used to compute
/// each moved file's quarantine-relative path; `quarantine_root` should
/// already include the `<timestamp>` segment.
pub fn move_duplicates(
    tree: &MediaNode,
    music_root: &Path,
    quarantine_root: &Path,
    mode: FingerprintMode,
    policy: KeepPolicy,
) -> MoveResult {
    let tracks = tree.all_tracks();
    let mut groups: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for track in tracks {
        groups
            .entry(fingerprint(&track, mode))
            .or_default()
            .push(track);
    }

    let mut moved = HashMap::new();
    let mut bytes_attempted = 0usize;

    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|p| {
            std::fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
        let kept = match policy {
            KeepPolicy::KeepNewest => group.last().cloned(),
            KeepPolicy::KeepOldest => group.first().cloned(),
        };
        let Some(kept) = kept else { continue };

        for candidate in &group {
            if *candidate == kept {
                continue;
            }
            match quarantine_one(candidate, music_root, quarantine_root) {
                Ok(bytes) => {
                    bytes_attempted += bytes;
                    moved.insert(candidate.clone(), kept.clone());
                }
                Err(e) => {
                    log::error!("failed to quarantine {}: {e}", candidate.display());
                }
            }
        }
    }

    MoveResult {
        moved,
        bytes_attempted,
    }
}

/// Write `<quarantine-folder>/dupes.log`, summarizing each moved file as
/// `<original> -> <kept>` (§6.1). Appends so repeated runs keep history.
pub fn write_dupes_log(
    quarantine_folder: &Path,
    moved: &HashMap<PathBuf, PathBuf>,
) -> std::io::Result<()> {
    use std::io::Write;

    if moved.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(quarantine_folder)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(quarantine_folder.join("dupes.log"))?;

    let mut entries: Vec<_> = moved.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (original, kept) in entries {
        writeln!(file, "{} -> {}", original.display(), kept.display())?;
    }
    Ok(())
}

fn quarantine_one(
    path: &Path,
    music_root: &Path,
    quarantine_root: &Path,
) -> std::io::Result<usize> {
    let relative = path.strip_prefix(music_root).unwrap_or(path);
    let dest = quarantine_root.join(relative);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let size = std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0);
    match std::fs::rename(path, &dest) {
        Ok(()) => Ok(size),
        Err(_) => {
            std::fs::copy(path, &dest)?;
            std::fs::remove_file(path)?;
            Ok(size)
        }
    }
}
