//! Crate-path fixer (component K): rebind broken track references in
//! existing crates by filename lookup against the freshly scanned media
//! tree, threading matching index corrections into [`crate::index_repair`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::crate_codec::{self, Crate};
use crate::index_codec::Index;
use crate::index_repair::PathFix;
use crate::io_prim::encode_utf16be;
use crate::path_norm;
use crate::scanner::MediaNode;

/// One crate that the fixer touched and that now needs writing (outside the
/// smart-write pass — a fixer write is unconditional).
pub struct DirtyCrate {
    pub path: PathBuf,
    pub data: Crate,
}

pub struct FixResult {
    pub dirty: Vec<DirtyCrate>,
    pub path_fixes: Vec<PathFix>,
    pub rebound_count: usize,
}

/// Scan every `*.crate` file directly under `subcrates_dir`, repairing
/// tracks whose on-disk path no longer resolves and collecting the
/// corresponding index corrections. Per-crate scanning runs in parallel;
/// the PathFix accumulator is a `Mutex`-guarded map keyed by old-bytes, per
/// §5's concurrent-map discipline.
pub fn fix_crates(
    subcrates_dir: &Path,
    media_tree: &MediaNode,
    index: Option<&Index>,
    volume_root: &Path,
) -> std::io::Result<FixResult> {
    let entries: Vec<PathBuf> = std::fs::read_dir(subcrates_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("crate"))
        .collect();

    let flattened = media_tree.flatten_by_filename();
    let fixes: Mutex<HashMap<Vec<u8>, PathFix>> = Mutex::new(HashMap::new());

    let dirty: Vec<DirtyCrate> = entries
        .par_iter()
        .filter_map(|path| {
            let bytes = match std::fs::read(path) {
                Ok(b) => b,
                Err(e) => {
                    log::warn!("failed to read crate {}: {e}", path.display());
                    return None;
                }
            };
            let parsed = match crate_codec::parse(&bytes) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("failed to parse crate {}: {e}", path.display());
                    return None;
                }
            };

            fix_one_crate(parsed, &flattened, index, volume_root, &fixes).map(|data| DirtyCrate {
                path: path.clone(),
                data,
            })
        })
        .collect();

    let path_fixes: Vec<PathFix> = fixes.into_inner().unwrap().into_values().collect();
    let rebound_count = dirty.len();

    Ok(FixResult {
        dirty,
        path_fixes,
        rebound_count,
    })
}

fn fix_one_crate(
    original: Crate,
    flattened: &HashMap<String, PathBuf>,
    index: Option<&Index>,
    volume_root: &Path,
    fixes: &Mutex<HashMap<Vec<u8>, PathFix>>,
) -> Option<Crate> {
    let mut dirty = false;
    let mut new_tracks = Vec::with_capacity(original.tracks().len());

    for track in original.tracks() {
        match resolve_existing(track, volume_root) {
            Some(resolved) => {
                let canonical_form = path_norm::canonical(&resolved.to_string_lossy());
                if &canonical_form != track {
                    dirty = true;
                }
                if let Some(idx) = index {
                    if let Some(index_track) = idx.lookup_by_filename(track, None) {
                        if index_track.path != canonical_form {
                            enqueue_fix(fixes, index_track.pfil_bytes.clone(), &canonical_form);
                        }
                    }
                }
                new_tracks.push(canonical_form);
            }
            None => {
                let leaf = path_norm::nfc_lower_filename(track);
                match flattened.get(&leaf) {
                    Some(resolved) => {
                        let new_dir = resolved
                            .parent()
                            .map(|p| path_norm::canonical(&p.to_string_lossy()))
                            .unwrap_or_default();
                        let host_filename = index
                            .and_then(|idx| idx.lookup_by_filename(track, None))
                            .map(|t| path_norm::filename(&t.path).to_string())
                            .unwrap_or_else(|| path_norm::filename(track).to_string());

                        let rebound = if new_dir.is_empty() {
                            host_filename
                        } else {
                            format!("{new_dir}/{host_filename}")
                        };

                        let old_bytes = index
                            .and_then(|idx| idx.lookup_by_filename(track, None))
                            .map(|t| t.pfil_bytes.clone())
                            .unwrap_or_else(|| encode_utf16be(track));
                        enqueue_fix(fixes, old_bytes, &rebound);

                        dirty = true;
                        new_tracks.push(rebound);
                    }
                    None => new_tracks.push(track.clone()), // broken, left unchanged
                }
            }
        }
    }

    if !dirty {
        return None;
    }

    let mut data = Crate::new();
    data.version = original.version.clone();
    data.sort_key = original.sort_key.clone();
    data.sort_revision = original.sort_revision;
    data.columns = original.columns.clone();
    for t in new_tracks {
        data.add_track(&t);
    }
    Some(data)
}

fn enqueue_fix(fixes: &Mutex<HashMap<Vec<u8>, PathFix>>, old_bytes: Vec<u8>, new_path: &str) {
    let new_bytes = encode_utf16be(new_path);
    let mut guard = fixes.lock().unwrap();
    guard
        .entry(old_bytes.clone())
        .or_insert_with(|| PathFix::new(old_bytes, new_bytes));
}

fn resolve_existing(path_str: &str, volume_root: &Path) -> Option<PathBuf> {
    let direct = PathBuf::from(path_str);
    if direct.exists() {
        return Some(direct);
    }
    let candidate = volume_root.join(path_str);
    if candidate.exists() {
        return Some(candidate);
    }
    None
}

/// Write a fixer-dirtied crate unconditionally (not a smart-write).
pub fn write_dirty(dirty: &DirtyCrate) -> std::io::Result<()> {
    let bytes = crate_codec::write(&dirty.data);
    std::fs::write(&dirty.path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TestTempDir {
        path: PathBuf,
    }

    impl TestTempDir {
        fn new(label: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!(
                "cratesync-fixer-test-{label}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&path);
            fs::create_dir_all(&path).unwrap();
            TestTempDir { path }
        }
    }

    impl Drop for TestTempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn rebinds_broken_path_via_media_tree_lookup() {
        let dir = TestTempDir::new("rebind");
        let music_root = dir.path.join("Music");
        fs::create_dir_all(music_root.join("NewDir")).unwrap();
        fs::write(music_root.join("NewDir/Track.mp3"), b"x").unwrap();

        let tree = crate::scanner::scan(&music_root);

        let mut c = Crate::new();
        c.add_track("OldDir/Track.mp3"); // no longer exists anywhere

        let fixes: Mutex<HashMap<Vec<u8>, PathFix>> = Mutex::new(HashMap::new());
        let flattened = tree.flatten_by_filename();
        let result = fix_one_crate(c, &flattened, None, &dir.path, &fixes);
        assert!(result.is_some());
        let fixed = result.unwrap();
        assert!(fixed.tracks()[0].ends_with("Track.mp3"));
        assert!(fixed.tracks()[0].contains("NewDir"));
    }

    #[test]
    fn leaves_truly_broken_paths_unchanged() {
        let dir = TestTempDir::new("broken");
        let mut c = Crate::new();
        c.add_track("Gone/Nowhere.mp3");
        let fixes: Mutex<HashMap<Vec<u8>, PathFix>> = Mutex::new(HashMap::new());
        let empty_map = HashMap::new();
        let result = fix_one_crate(c, &empty_map, None, &dir.path, &fixes);
        assert!(result.is_none());
    }

    #[test]
    fn existing_path_with_different_form_is_canonicalized_and_marked_dirty() {
        let dir = TestTempDir::new("canon");
        // A literal filename containing a backslash: resolves via the
        // volume-root fallback, but its canonical form (slash-normalized)
        // differs from the in-file string, so the fixer should mark it dirty.
        fs::write(dir.path.join("Music\\A.mp3"), b"x").unwrap();

        let mut c = Crate::new();
        c.add_track("Music\\A.mp3");

        let fixes: Mutex<HashMap<Vec<u8>, PathFix>> = Mutex::new(HashMap::new());
        let empty_map = HashMap::new();
        let result = fix_one_crate(c, &empty_map, None, &dir.path, &fixes);
        assert!(result.is_some());
        assert_eq!(result.unwrap().tracks()[0], "Music/A.mp3");
    }
}
