//! Track index / dedup (component J): a unified read-only view over the
//! library index and a scan of existing crates, answering "have we already
//! got this track" for the crate tree builder and the path fixer.

use std::collections::HashSet;
use std::sync::Arc;

use crate::crate_codec::Crate;
use crate::index_codec::{normalized_path_key, Index};
use crate::path_norm;

/// Matching strategy for [`TrackIndex::contains`] (§4.J).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    Off,
    Path,
    Filename,
}

/// Existing crates don't carry file size, so the existing-crate-scan source
/// only ever matches on path or filename; the index source can additionally
/// match on size when the caller supplies one.
pub struct TrackIndex {
    mode: DedupMode,
    index: Option<Arc<Index>>,
    existing_keys: HashSet<String>,
}

impl TrackIndex {
    pub fn new(mode: DedupMode, index: Option<Arc<Index>>, existing_crates: &[Crate]) -> Self {
        let existing_keys = match mode {
            DedupMode::Off => HashSet::new(),
            DedupMode::Path => existing_crates
                .iter()
                .flat_map(|c| c.tracks())
                .map(|t| path_norm::nfc(&path_norm::canonical(t)).to_lowercase())
                .collect(),
            DedupMode::Filename => existing_crates
                .iter()
                .flat_map(|c| c.tracks())
                .map(|t| path_norm::nfc_lower_filename(t))
                .collect(),
        };

        TrackIndex {
            mode,
            index,
            existing_keys,
        }
    }

    pub fn contains(&self, path: &str, size: Option<&str>) -> bool {
        match self.mode {
            DedupMode::Off => false,
            DedupMode::Path => {
                let in_index = self
                    .index
                    .as_ref()
                    .map(|idx| idx.lookup_by_path(path, size).is_some())
                    .unwrap_or(false);
                in_index || self.existing_keys.contains(&normalized_path_key(path))
            }
            DedupMode::Filename => {
                let in_index = self
                    .index
                    .as_ref()
                    .map(|idx| idx.lookup_by_filename(path, size).is_some())
                    .unwrap_or(false);
                in_index
                    || self
                        .existing_keys
                        .contains(&path_norm::nfc_lower_filename(path))
            }
        }
    }
}
