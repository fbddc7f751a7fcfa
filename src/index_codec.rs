//! Index codec — read side (component D).
//!
//! Parses the host's main library index (`database V2`) into an in-memory
//! [`Index`] that answers filename/path lookups. Mutation of the index is
//! handled entirely by [`crate::index_repair`] operating on the raw bytes;
//! `IndexTrack` here is read-only, built once from a byte buffer that is
//! never mutated through it (§3).

use std::collections::HashMap;

use crate::error::CodecError;
use crate::io_prim::Reader;
use crate::path_norm;

/// One `otrk` record's essential fields, as read from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTrack {
    /// Exact bytes of the `pfil` payload (UTF-16BE), preserved verbatim.
    pub pfil_bytes: Vec<u8>,
    pub path: String,
    /// `tsiz` payload, if present, as the host's literal text (not parsed
    /// to a number — it is only ever used as an opaque dedup key component).
    pub size: Option<String>,
}

/// A parsed library index. Built once by [`parse`]; looked up by normalized
/// path or by NFC-lowercased filename, both keyed additionally by the raw
/// `tsiz` text (or `""` when absent), per §4.D.
#[derive(Debug, Default)]
pub struct Index {
    pub version: String,
    tracks: Vec<IndexTrack>,
    by_path: HashMap<(String, String), usize>,
    by_filename: HashMap<(String, String), usize>,
}

impl Index {
    /// `(normalized-path, size-or-empty) -> pfil bytes`. `normalized-path`
    /// strips the volume prefix, lowercases, and applies NFC (§4.D).
    pub fn lookup_by_path(&self, path: &str, size: Option<&str>) -> Option<&IndexTrack> {
        let key = (normalized_path_key(path), size.unwrap_or("").to_string());
        self.by_path.get(&key).map(|&i| &self.tracks[i])
    }

    /// `(nfc-lowercased-filename, size-or-empty) -> pfil bytes`.
    pub fn lookup_by_filename(&self, path: &str, size: Option<&str>) -> Option<&IndexTrack> {
        let key = (
            path_norm::nfc_lower_filename(path),
            size.unwrap_or("").to_string(),
        );
        self.by_filename.get(&key).map(|&i| &self.tracks[i])
    }

    /// Like [`lookup_by_path`](Self::lookup_by_path), but ignores whatever
    /// `tsiz` the index recorded — for callers (the duplicate mover's
    /// path-fix construction) that only have a path, not a size, to go on.
    pub fn find_by_path_ignoring_size(&self, path: &str) -> Option<&IndexTrack> {
        let key = normalized_path_key(path);
        self.tracks.iter().find(|t| normalized_path_key(&t.path) == key)
    }

    /// Like [`lookup_by_filename`](Self::lookup_by_filename), ignoring size.
    pub fn find_by_filename_ignoring_size(&self, path: &str) -> Option<&IndexTrack> {
        let key = path_norm::nfc_lower_filename(path);
        self.tracks
            .iter()
            .find(|t| path_norm::nfc_lower_filename(&t.path) == key)
    }

    pub fn tracks(&self) -> &[IndexTrack] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Strip a volume prefix, lowercase, and NFC-normalize a path for use as an
/// index lookup key (§4.D).
pub(crate) fn normalized_path_key(path: &str) -> String {
    path_norm::nfc(&path_norm::canonical(path)).to_lowercase()
}

/// Parse a `database V2` byte buffer into an [`Index`].
///
/// Format: header `vrsn` + two zero bytes + 16-bit big-endian length +
/// UTF-16BE version string, then a sequence of `otrk` blocks each containing
/// `<4-byte tag><4-byte length><payload>` fields. Only `pfil` and `tsiz` are
/// interpreted; every other field tag is skipped by its length (§4.D).
pub fn parse(buf: &[u8]) -> Result<Index, CodecError> {
    let mut r = Reader::new(buf);

    r.expect_ascii(b"vrsn")?;
    r.read_bytes(2)?; // two zero bytes
    let version_len = r.read_u16()? as usize;
    let version = r.read_utf16be(version_len)?;

    let mut index = Index {
        version,
        tracks: Vec::new(),
        by_path: HashMap::new(),
        by_filename: HashMap::new(),
    };

    loop {
        if r.is_at_end() {
            break;
        }

        let tag_offset = r.pos();
        let tag = r.read_bytes(4);
        let tag = match tag {
            Ok(t) => t,
            Err(_) if r.pos() == tag_offset => break,
            Err(e) => return Err(e),
        };
        if tag != b"otrk" {
            return Err(CodecError::FormatMismatch {
                expected: b"otrk".to_vec(),
                actual: tag.to_vec(),
                offset: tag_offset,
            });
        }

        let block_len = r.read_u32()? as usize;
        let payload = r.read_bytes(block_len)?;
        let track = parse_otrk_payload(payload)?;

        let idx = index.tracks.len();
        let size_key = track.size.clone().unwrap_or_default();
        index
            .by_path
            .insert((normalized_path_key(&track.path), size_key.clone()), idx);
        index
            .by_filename
            .insert((path_norm::nfc_lower_filename(&track.path), size_key), idx);
        index.tracks.push(track);
    }

    Ok(index)
}

fn parse_otrk_payload(payload: &[u8]) -> Result<IndexTrack, CodecError> {
    let mut r = Reader::new(payload);
    let mut pfil_bytes = None;
    let mut path = None;
    let mut size = None;

    while !r.is_at_end() {
        let tag = r.read_bytes(4)?;
        let len = r.read_u32()? as usize;
        let field = r.read_bytes(len)?;

        match tag {
            b"pfil" => {
                pfil_bytes = Some(field.to_vec());
                path = Some(
                    crate::io_prim::decode_utf16be(field)
                        .ok_or(CodecError::InvalidString { offset: r.pos() - len })?,
                );
            }
            b"tsiz" => {
                size = crate::io_prim::decode_utf16be(field);
            }
            _ => {} // opaque, skipped by length
        }
    }

    Ok(IndexTrack {
        pfil_bytes: pfil_bytes.unwrap_or_default(),
        path: path.unwrap_or_default(),
        size,
    })
}
