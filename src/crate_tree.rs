//! Crate tree builder (component H): map a scanned [`MediaNode`] tree to
//! [`crate::crate_codec::Crate`] objects under a hierarchical naming scheme.

use std::sync::Arc;
use thiserror::Error;

use crate::crate_codec::Crate;
use crate::index_codec::Index;
use crate::scanner::MediaNode;
use crate::track_index::TrackIndex;

const DELIMITER: &str = "%%";

#[derive(Debug, Error)]
pub enum CrateNameError {
    #[error("crate name segment {0:?} must not contain '%%'")]
    InvalidSegment(String),
}

/// A hierarchical crate name: a list of directory segments, empty for the
/// bare root crate (§3). Serializes with `%%` as the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrateName(Vec<String>);

impl CrateName {
    pub fn root() -> Self {
        CrateName(Vec::new())
    }

    pub fn from_segments(segments: Vec<String>) -> Result<Self, CrateNameError> {
        for s in &segments {
            if s.contains(DELIMITER) {
                return Err(CrateNameError::InvalidSegment(s.clone()));
            }
        }
        Ok(CrateName(segments))
    }

    /// Return a new name with `segment` appended.
    pub fn push(&self, segment: &str) -> Result<Self, CrateNameError> {
        if segment.contains(DELIMITER) {
            return Err(CrateNameError::InvalidSegment(segment.to_string()));
        }
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Ok(CrateName(segments))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn serialize(&self) -> String {
        self.0.join(DELIMITER)
    }

    pub fn file_name(&self) -> String {
        format!("{}.crate", self.serialize())
    }
}

/// One crate produced by the builder, paired with its name and a dedup stat.
pub struct BuiltCrate {
    pub name: CrateName,
    pub data: Crate,
    /// Count of this crate's tracks that [`TrackIndex::contains`] reports as
    /// already present elsewhere (index or an existing crate scan).
    pub skipped_existing: usize,
}

/// Build one [`BuiltCrate`] per node in `root`'s tree. `parent` is the
/// configured parent-crate name the root node's crate represents; deeper
/// nodes extend it with their own directory-name segment.
pub fn build(
    root: &MediaNode,
    parent: &CrateName,
    track_index: Option<&TrackIndex>,
    shared_index: Option<Arc<Index>>,
) -> Result<Vec<BuiltCrate>, CrateNameError> {
    let mut out = Vec::new();
    build_node(root, parent, 0, track_index, &shared_index, &mut out)?;
    Ok(out)
}

fn build_node(
    node: &MediaNode,
    parent: &CrateName,
    depth: usize,
    track_index: Option<&TrackIndex>,
    shared_index: &Option<Arc<Index>>,
    out: &mut Vec<BuiltCrate>,
) -> Result<(), CrateNameError> {
    let name = if depth == 0 {
        parent.clone()
    } else {
        parent.push(&node.name)?
    };

    let mut data = match shared_index {
        Some(idx) => Crate::with_index(Arc::clone(idx)),
        None => Crate::new(),
    };

    let mut skipped_existing = 0;
    for track in &node.tracks {
        let path_str = track.to_string_lossy().to_string();
        if let Some(ti) = track_index {
            if ti.contains(&path_str, None) {
                skipped_existing += 1;
            }
        }
        data.add_track(&path_str);
    }

    out.push(BuiltCrate {
        name: name.clone(),
        data,
        skipped_existing,
    });

    for child in &node.children {
        build_node(child, &name, depth + 1, track_index, shared_index, out)?;
    }

    Ok(())
}
