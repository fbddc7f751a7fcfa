//! Media-tree scanner (component G): parallel recursive directory walk
//! producing a nested, deterministically-ordered tree of media files.
//!
//! Grounded on the pack's scanner pattern of `rayon::prelude::*` fanning out
//! over directory entries (see PowerPlayer's `scanner.rs`), adapted to a
//! dedicated bounded pool per §5's `min(4, core-count)` recommendation
//! rather than the global rayon pool.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

const MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "aif", "aiff", "aac", "alac", "m4a", "mov", "mp4", "avi", "flv",
    "mpg", "mpeg", "dv", "qtz",
];

/// A directory in the scanned tree (§3). Immutable once [`scan`] returns.
#[derive(Debug, Clone)]
pub struct MediaNode {
    pub name: String,
    /// Resolved (realpath) track paths, sorted by codepoint.
    pub tracks: Vec<PathBuf>,
    /// Child directories, sorted by directory name.
    pub children: Vec<MediaNode>,
}

impl MediaNode {
    /// Total track count across this node and every descendant.
    pub fn total_tracks(&self) -> usize {
        self.tracks.len() + self.children.iter().map(|c| c.total_tracks()).sum::<usize>()
    }

    /// Every track path across this node and every descendant.
    pub fn all_tracks(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.collect_tracks(&mut out);
        out
    }

    fn collect_tracks(&self, out: &mut Vec<PathBuf>) {
        out.extend(self.tracks.iter().cloned());
        for child in &self.children {
            child.collect_tracks(out);
        }
    }

    /// Flatten into `(nfc-lowercased leaf filename) -> resolved path`, for
    /// the crate-path fixer's broken-path rebind lookup (§4.K).
    pub fn flatten_by_filename(&self) -> std::collections::HashMap<String, PathBuf> {
        let mut map = std::collections::HashMap::new();
        self.flatten_into(&mut map);
        map
    }

    fn flatten_into(&self, map: &mut std::collections::HashMap<String, PathBuf>) {
        for track in &self.tracks {
            if let Some(leaf) = track.file_name().and_then(|n| n.to_str()) {
                map.insert(crate::path_norm::nfc_lower_filename(leaf), track.clone());
            }
        }
        for child in &self.children {
            child.flatten_into(map);
        }
    }
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn resolve_real_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|e| {
        log::warn!("failed to resolve real path for {}: {e}", path.display());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

/// Scan `root`, building a [`MediaNode`] tree. Uses a dedicated worker pool
/// of `min(4, core-count)` threads; falls back to the current thread if the
/// pool fails to build.
pub fn scan(root: &Path) -> MediaNode {
    let degree = std::cmp::min(4, num_cpus::get()).max(1);
    match rayon::ThreadPoolBuilder::new().num_threads(degree).build() {
        Ok(pool) => pool.install(|| scan_node(root)),
        Err(e) => {
            log::warn!("failed to build scan worker pool, scanning on current thread: {e}");
            scan_node(root)
        }
    }
}

fn scan_node(dir: &Path) -> MediaNode {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("failed to read directory {}: {e}", dir.display());
            return MediaNode {
                name,
                tracks: Vec::new(),
                children: Vec::new(),
            };
        }
    };

    let mut track_files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("failed to stat {}: {e}", path.display());
                continue;
            }
        };

        if file_type.is_dir() {
            subdirs.push(path);
        } else if (file_type.is_file() || file_type.is_symlink()) && is_media_file(&path) {
            track_files.push(path);
        }
    }

    let mut tracks: Vec<PathBuf> = track_files.iter().map(|p| resolve_real_path(p)).collect();
    tracks.sort();

    let mut children: Vec<MediaNode> = if subdirs.len() <= 1 {
        subdirs.iter().map(|d| scan_node(d)).collect()
    } else {
        subdirs.par_iter().map(|d| scan_node(d)).collect()
    };
    children.sort_by(|a, b| a.name.cmp(&b.name));

    MediaNode {
        name,
        tracks,
        children,
    }
}
