//! Crate codec (component C): parse and emit `.crate` files.
//!
//! A crate file opens with a fixed header (`vrsn`, a version string, and the
//! literal `/Serato ScratchLive Crate`), then a flat sequence of tagged
//! blocks — `osrt` (sort metadata), `ovct` (one per column), `otrk` (one per
//! track). Block order on disk is not significant for parsing; write always
//! emits them in the canonical order described in `write`.

use std::sync::Arc;

use crate::error::CodecError;
use crate::index_codec::Index;
use crate::io_prim::{decode_utf16be, encode_utf16be, Reader, Writer};
use crate::path_norm;

const HEADER_LITERAL: &str = "/Serato ScratchLive Crate";

pub const DEFAULT_VERSION: &str = "81.0";
pub const DEFAULT_SORT_KEY: &str = "song";
pub const DEFAULT_SORT_REVISION: u64 = 1 << 8;

fn default_columns() -> Vec<String> {
    ["song", "artist", "album", "length"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// In-memory representation of a `.crate` file (§3).
pub struct Crate {
    pub version: String,
    pub sort_key: String,
    pub sort_revision: u64,
    pub columns: Vec<String>,
    tracks: Vec<String>,
    /// Non-owning reference to the index, used to prefer the host's own
    /// filename byte-encoding when a track's path is already known there.
    /// The index is expected to outlive every crate that borrows it.
    index: Option<Arc<Index>>,
}

impl Crate {
    pub fn new() -> Self {
        Crate {
            version: DEFAULT_VERSION.to_string(),
            sort_key: DEFAULT_SORT_KEY.to_string(),
            sort_revision: DEFAULT_SORT_REVISION,
            columns: default_columns(),
            tracks: Vec::new(),
            index: None,
        }
    }

    pub fn with_index(index: Arc<Index>) -> Self {
        let mut c = Self::new();
        c.index = Some(index);
        c
    }

    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    /// Append a track path, rejecting it if a track with the same
    /// NFC-lowercased leaf filename is already present (§3).
    pub fn add_track(&mut self, path: &str) -> bool {
        let key = path_norm::nfc_lower_filename(path);
        let dup = self
            .tracks
            .iter()
            .any(|t| path_norm::nfc_lower_filename(t) == key);
        if dup {
            return false;
        }
        self.tracks.push(path.to_string());
        true
    }

    /// Canonical-form path for writing: if the index has a record for this
    /// exact path (by filename lookup), its `pfil` bytes decode to the
    /// host's own encoding; otherwise fall back to `canonical(path)`.
    fn resolved_path_for_write(&self, path: &str) -> String {
        if let Some(idx) = &self.index {
            if let Some(track) = idx.lookup_by_filename(path, None) {
                return track.path.clone();
            }
        }
        path_norm::canonical(path)
    }

    /// Crate equality per §4.C: versions, sort key, sort revision, columns,
    /// and canonical-form track lists (element-wise) must all match.
    pub fn equals(&self, other: &Crate) -> bool {
        if self.version != other.version
            || self.sort_key != other.sort_key
            || self.sort_revision != other.sort_revision
            || self.columns != other.columns
            || self.tracks.len() != other.tracks.len()
        {
            return false;
        }
        self.tracks
            .iter()
            .zip(other.tracks.iter())
            .all(|(a, b)| path_norm::canonical(a) == path_norm::canonical(b))
    }
}

impl Default for Crate {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a `.crate` byte buffer.
pub fn parse(buf: &[u8]) -> Result<Crate, CodecError> {
    let mut r = Reader::new(buf);

    r.expect_ascii(b"vrsn")?;
    r.read_bytes(2)?; // two zero bytes
    let version = r.read_utf16be(8)?;
    let literal_bytes = encode_utf16be(HEADER_LITERAL);
    let literal = r.read_bytes(literal_bytes.len())?;
    if literal != literal_bytes {
        return Err(CodecError::FormatMismatch {
            expected: literal_bytes,
            actual: literal.to_vec(),
            offset: r.pos() - literal.len(),
        });
    }

    let mut c = Crate {
        version,
        sort_key: DEFAULT_SORT_KEY.to_string(),
        sort_revision: DEFAULT_SORT_REVISION,
        columns: Vec::new(),
        tracks: Vec::new(),
        index: None,
    };

    loop {
        if r.is_at_end() {
            break;
        }

        let tag_offset = r.pos();
        let tag = match r.read_bytes(4) {
            Ok(t) => t,
            Err(_) if r.pos() == tag_offset => break,
            Err(e) => return Err(e),
        };
        let block_len = r.read_u32()? as usize;
        let payload = r.read_bytes(block_len)?;

        match tag {
            b"osrt" => {
                let (sort_key, sort_revision) = parse_osrt_payload(payload)?;
                if let Some(k) = sort_key {
                    c.sort_key = k;
                }
                c.sort_revision = sort_revision;
            }
            b"ovct" => {
                c.columns.push(parse_ovct_payload(payload)?);
            }
            b"otrk" => {
                c.tracks.push(parse_otrk_payload(payload)?);
            }
            _ => {} // unknown block tag, skipped by length
        }
    }

    if c.columns.is_empty() {
        c.columns = default_columns();
    }

    Ok(c)
}

fn parse_osrt_payload(payload: &[u8]) -> Result<(Option<String>, u64), CodecError> {
    let mut r = Reader::new(payload);
    if payload.len() >= 4 && &payload[0..4] == b"tvcn" {
        r.read_bytes(4)?;
        let len = r.read_u32()? as usize;
        let sort_name = r.read_utf16be(len)?;
        r.expect_ascii(b"brev")?;
        let rev = r.read_u40()?;
        Ok((Some(sort_name), rev))
    } else {
        r.expect_ascii(b"brev")?;
        let rev = r.read_u40()?;
        Ok((None, rev))
    }
}

fn parse_ovct_payload(payload: &[u8]) -> Result<String, CodecError> {
    let mut r = Reader::new(payload);
    r.expect_ascii(b"tvcn")?;
    let len = r.read_u32()? as usize;
    let name = r.read_utf16be(len)?;
    r.expect_ascii(b"tvcw")?;
    let width_len = r.read_u32()? as usize; // = 2
    r.read_bytes(width_len)?; // one leading 0x00 byte, one trailing byte (opaque)
    Ok(name)
}

fn parse_otrk_payload(payload: &[u8]) -> Result<String, CodecError> {
    let mut r = Reader::new(payload);
    r.expect_ascii(b"ptrk")?;
    let len = r.read_u32()? as usize;
    r.read_utf16be(len)
}

/// Serialize a crate: header, one full-form `osrt`, one `ovct` per column,
/// one `otrk` per track in insertion order. Each `otrk` path is
/// `resolved_path_for_write` of the in-memory track string.
pub fn write(c: &Crate) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_ascii(b"vrsn");
    w.write_bytes(&[0, 0]);
    w.write_utf16be(&c.version);
    w.write_utf16be(HEADER_LITERAL);

    let mut osrt = Writer::new();
    osrt.write_ascii(b"tvcn");
    let sort_name_bytes = encode_utf16be(&c.sort_key);
    osrt.write_u32(sort_name_bytes.len() as u32);
    osrt.write_bytes(&sort_name_bytes);
    osrt.write_ascii(b"brev");
    osrt.write_u40(c.sort_revision);
    let osrt_bytes = osrt.into_bytes();
    w.write_ascii(b"osrt");
    w.write_u32(osrt_bytes.len() as u32);
    w.write_bytes(&osrt_bytes);

    for column in &c.columns {
        let mut ovct = Writer::new();
        ovct.write_ascii(b"tvcn");
        let name_bytes = encode_utf16be(column);
        ovct.write_u32(name_bytes.len() as u32);
        ovct.write_bytes(&name_bytes);
        ovct.write_ascii(b"tvcw");
        ovct.write_u32(2);
        ovct.write_u8(0x00);
        ovct.write_u8(0x00);
        let ovct_bytes = ovct.into_bytes();
        w.write_ascii(b"ovct");
        w.write_u32(ovct_bytes.len() as u32);
        w.write_bytes(&ovct_bytes);
    }

    for track in &c.tracks {
        let path = c.resolved_path_for_write(track);
        let mut otrk = Writer::new();
        otrk.write_ascii(b"ptrk");
        let path_bytes = encode_utf16be(&path);
        otrk.write_u32(path_bytes.len() as u32);
        otrk.write_bytes(&path_bytes);
        let otrk_bytes = otrk.into_bytes();
        w.write_ascii(b"otrk");
        w.write_u32(otrk_bytes.len() as u32);
        w.write_bytes(&otrk_bytes);
    }

    w.into_bytes()
}

/// Decode a raw `otrk` path payload straight from bytes, for callers (the
/// test suite, mainly) that want to assert on-disk `ptrk` contents without
/// going through the full parser.
pub fn decode_ptrk_payload(bytes: &[u8]) -> Option<String> {
    decode_utf16be(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_crate_roundtrip() {
        let c = Crate::new();
        let bytes = write(&c);
        let parsed = parse(&bytes).unwrap();
        assert!(parsed.tracks().is_empty());
        assert_eq!(parsed.version, DEFAULT_VERSION);
        assert_eq!(parsed.sort_key, DEFAULT_SORT_KEY);
        assert_eq!(parsed.sort_revision, DEFAULT_SORT_REVISION);
        assert_eq!(parsed.columns, default_columns());
        assert!(c.equals(&parsed));
    }

    #[test]
    fn three_track_crate_ptrk_payloads() {
        let mut c = Crate::new();
        assert!(c.add_track("/Volumes/V/Music/A.mp3"));
        assert!(c.add_track("/Volumes/V/Music/B.mp3"));
        assert!(c.add_track("Music/C.mp3"));

        let bytes = write(&c);
        let mut r = Reader::new(&bytes);
        r.expect_ascii(b"vrsn").unwrap();
        r.read_bytes(2).unwrap();
        r.read_utf16be(8).unwrap();
        let literal_bytes = encode_utf16be(HEADER_LITERAL);
        r.read_bytes(literal_bytes.len()).unwrap();

        let mut ptrk_paths = Vec::new();
        while !r.is_at_end() {
            let tag = r.read_bytes(4).unwrap();
            let len = r.read_u32().unwrap() as usize;
            let payload = r.read_bytes(len).unwrap();
            if tag == b"otrk" {
                let mut pr = Reader::new(payload);
                pr.expect_ascii(b"ptrk").unwrap();
                let plen = pr.read_u32().unwrap() as usize;
                let path_bytes = pr.read_bytes(plen).unwrap();
                ptrk_paths.push(decode_ptrk_payload(path_bytes).unwrap());
            }
        }

        assert_eq!(
            ptrk_paths,
            vec!["Music/A.mp3", "Music/B.mp3", "Music/C.mp3"]
        );
    }

    #[test]
    fn add_track_rejects_duplicate_leaf() {
        let mut c = Crate::new();
        assert!(c.add_track("/Volumes/V/Music/A.mp3"));
        assert!(!c.add_track("Other/Path/a.mp3"));
        assert_eq!(c.tracks().len(), 1);
    }

    #[test]
    fn equality_ignores_absolute_vs_relative_and_slash_form() {
        let mut a = Crate::new();
        a.add_track("/Volumes/V/Music/A.mp3");

        let mut b = Crate::new();
        b.add_track(r"Music\A.mp3");

        assert!(a.equals(&b));
    }

    #[test]
    fn equality_detects_column_or_version_differences() {
        let mut a = Crate::new();
        a.add_track("Music/A.mp3");
        let mut b = Crate::new();
        b.add_track("Music/A.mp3");
        b.version = "82.0".to_string();
        assert!(!a.equals(&b));
    }

    #[test]
    fn unknown_block_tags_are_skipped() {
        let mut c = Crate::new();
        c.add_track("Music/A.mp3");
        let mut bytes = write(&c);

        // Splice an unknown block right after the header-literal, before osrt.
        let header_len = {
            let mut r = Reader::new(&bytes);
            r.expect_ascii(b"vrsn").unwrap();
            r.read_bytes(2).unwrap();
            r.read_utf16be(8).unwrap();
            let literal_bytes = encode_utf16be(HEADER_LITERAL);
            r.read_bytes(literal_bytes.len()).unwrap();
            r.pos()
        };
        let mut spliced = bytes[..header_len].to_vec();
        spliced.extend_from_slice(b"zzzz");
        spliced.extend_from_slice(&3u32.to_be_bytes());
        spliced.extend_from_slice(b"abc");
        spliced.extend_from_slice(&bytes[header_len..]);
        bytes = spliced;

        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.tracks(), &["Music/A.mp3"]);
    }

    #[test]
    fn short_form_osrt_without_sort_name() {
        let mut w = Writer::new();
        w.write_ascii(b"vrsn");
        w.write_bytes(&[0, 0]);
        w.write_utf16be(DEFAULT_VERSION);
        w.write_utf16be(HEADER_LITERAL);

        let mut osrt = Writer::new();
        osrt.write_ascii(b"brev");
        osrt.write_u40(42);
        let osrt_bytes = osrt.into_bytes();
        w.write_ascii(b"osrt");
        w.write_u32(osrt_bytes.len() as u32);
        w.write_bytes(&osrt_bytes);

        let parsed = parse(&w.into_bytes()).unwrap();
        assert_eq!(parsed.sort_key, DEFAULT_SORT_KEY); // left at default
        assert_eq!(parsed.sort_revision, 42);
    }
}
