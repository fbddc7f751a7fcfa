//! Session codec (component F): parse `.session` history files and the
//! `history.database` catalog, and perform the two in-place mutations the
//! pipeline needs — path substitution and short-session pruning.
//!
//! Same outer wrapping as the crate and index codecs (`vrsn` header, then a
//! flat sequence of 4-byte-tagged blocks). A session's `oent` blocks each
//! wrap one `adat` block, which in turn holds small-integer-ID fields
//! (`<1-byte id><4-byte big-endian length><payload>`). Only field `0x02`
//! (file path) and `0x2D` (duration seconds) are semantically significant;
//! everything else is carried through byte-for-byte.

use std::fs;
use std::path::Path;

use crate::error::CodecError;
use crate::io_prim::{decode_utf16be, encode_utf16be, trailing_nul_units, Reader};

pub const PATH_FIELD_ID: u8 = 0x02;
pub const DURATION_FIELD_ID: u8 = 0x2D;

/// One `oent` entry, as read from a session file. `other_fields` preserves
/// every `adat` field besides path/duration, in order, for pass-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub path: Option<String>,
    pub duration: Option<u32>,
    pub other_fields: Vec<(u8, Vec<u8>)>,
}

fn parse_header(r: &mut Reader) -> Result<String, CodecError> {
    r.expect_ascii(b"vrsn")?;
    r.read_bytes(2)?;
    let len = r.read_u16()? as usize;
    r.read_utf16be(len)
}

/// Parse every `oent` entry in a session file.
pub fn parse_session(buf: &[u8]) -> Result<Vec<SessionEntry>, CodecError> {
    let mut r = Reader::new(buf);
    parse_header(&mut r)?;

    let mut entries = Vec::new();
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
        let len = r.read_u32()? as usize;
        let payload = r.read_bytes(len)?;

        if tag == b"oent" {
            entries.push(parse_oent_payload(payload)?);
        }
    }

    Ok(entries)
}

fn parse_oent_payload(payload: &[u8]) -> Result<SessionEntry, CodecError> {
    let mut r = Reader::new(payload);
    r.expect_ascii(b"adat")?;
    let adat_len = r.read_u32()? as usize;
    let adat_payload = r.read_bytes(adat_len)?;

    let mut entry = SessionEntry {
        path: None,
        duration: None,
        other_fields: Vec::new(),
    };

    let mut fr = Reader::new(adat_payload);
    while !fr.is_at_end() {
        let id = fr.read_u8()?;
        let flen = fr.read_u32()? as usize;
        let fval = fr.read_bytes(flen)?;

        match id {
            PATH_FIELD_ID => entry.path = decode_utf16be(fval),
            DURATION_FIELD_ID if flen == 4 => {
                entry.duration = Some(u32::from_be_bytes([fval[0], fval[1], fval[2], fval[3]]));
            }
            _ => entry.other_fields.push((id, fval.to_vec())),
        }
    }

    Ok(entry)
}

/// Rewrite every `oent` whose `adat` path field equals `old_path` (compared
/// with trailing 16-bit NUL units stripped from both sides) to `new_path`,
/// padded with the same count of trailing NUL units the original field had.
/// Recomputes the enclosing `adat` and `oent` length fields. Blocks that
/// don't match are copied through unchanged. Returns the new buffer and the
/// number of entries rewritten.
pub fn apply_path_fix(
    buf: &[u8],
    old_path: &str,
    new_path: &str,
) -> Result<(Vec<u8>, usize), CodecError> {
    let mut r = Reader::new(buf);
    let header_start = r.pos();
    parse_header(&mut r)?;
    let header_end = r.pos();

    let mut out = buf[header_start..header_end].to_vec();
    let mut applied = 0;

    let old_value = encode_utf16be(old_path);
    let old_stripped = strip_trailing_nuls(&old_value);

    loop {
        if r.is_at_end() {
            break;
        }
        let block_start = r.pos();
        let tag = match r.read_bytes(4) {
            Ok(t) => t,
            Err(_) if r.pos() == block_start => break,
            Err(e) => return Err(e),
        };
        let len = r.read_u32()? as usize;
        let payload = r.read_bytes(len)?;
        let block_end = r.pos();

        if tag != b"oent" {
            out.extend_from_slice(&buf[block_start..block_end]);
            continue;
        }

        match rewrite_oent_if_matching(payload, old_stripped, new_path) {
            Some(new_payload) => {
                out.extend_from_slice(b"oent");
                out.extend_from_slice(&(new_payload.len() as u32).to_be_bytes());
                out.extend_from_slice(&new_payload);
                applied += 1;
            }
            None => out.extend_from_slice(&buf[block_start..block_end]),
        }
    }

    Ok((out, applied))
}

fn strip_trailing_nuls(bytes: &[u8]) -> &[u8] {
    let nuls = trailing_nul_units(bytes);
    &bytes[..bytes.len() - nuls * 2]
}

/// If `oent_payload`'s `adat` path field (stripped of trailing NULs) equals
/// `old_stripped`, return the rewritten `oent` payload bytes; else `None`.
fn rewrite_oent_if_matching(
    oent_payload: &[u8],
    old_stripped: &[u8],
    new_path: &str,
) -> Option<Vec<u8>> {
    let mut r = Reader::new(oent_payload);
    r.expect_ascii(b"adat").ok()?;
    let adat_len = r.read_u32().ok()? as usize;
    let adat_payload = r.read_bytes(adat_len).ok()?;
    let after_adat_start = r.pos();

    let mut fr = Reader::new(adat_payload);
    while !fr.is_at_end() {
        let field_start = fr.pos();
        let id = fr.read_u8().ok()?;
        let flen = fr.read_u32().ok()? as usize;
        let fval = fr.read_bytes(flen).ok()?;

        if id == PATH_FIELD_ID && strip_trailing_nuls(fval) == old_stripped {
            let nul_units = trailing_nul_units(fval);
            let mut new_val = encode_utf16be(new_path);
            new_val.extend(std::iter::repeat(0u8).take(nul_units * 2));

            let field_end = fr.pos();
            let mut new_adat_payload = Vec::with_capacity(adat_payload.len());
            new_adat_payload.extend_from_slice(&adat_payload[..field_start]);
            new_adat_payload.push(id);
            new_adat_payload.extend_from_slice(&(new_val.len() as u32).to_be_bytes());
            new_adat_payload.extend_from_slice(&new_val);
            new_adat_payload.extend_from_slice(&adat_payload[field_end..]);

            let mut new_oent_payload = Vec::with_capacity(oent_payload.len());
            new_oent_payload.extend_from_slice(b"adat");
            new_oent_payload.extend_from_slice(&(new_adat_payload.len() as u32).to_be_bytes());
            new_oent_payload.extend_from_slice(&new_adat_payload);
            new_oent_payload.extend_from_slice(&oent_payload[after_adat_start..]);
            return Some(new_oent_payload);
        }
    }
    None
}

/// `history.database` holds a `vrsn` header, `ocol` column-definition
/// blocks, and one `oses` block per session on record. `oses`' own `sess`
/// field carries the session's base name (without `.session`).
pub fn scrub_history_database(buf: &[u8], deleted_names: &[String]) -> Result<Vec<u8>, CodecError> {
    let mut r = Reader::new(buf);
    let header_start = r.pos();
    parse_header(&mut r)?;
    let header_end = r.pos();

    let mut out = buf[header_start..header_end].to_vec();

    loop {
        if r.is_at_end() {
            break;
        }
        let block_start = r.pos();
        let tag = match r.read_bytes(4) {
            Ok(t) => t,
            Err(_) if r.pos() == block_start => break,
            Err(e) => return Err(e),
        };
        let len = r.read_u32()? as usize;
        let payload = r.read_bytes(len)?;
        let block_end = r.pos();

        if tag == b"oses" {
            if let Some(name) = oses_name(payload) {
                if deleted_names.iter().any(|d| d == &name) {
                    continue; // scrubbed
                }
            }
        }
        out.extend_from_slice(&buf[block_start..block_end]);
    }

    Ok(out)
}

fn oses_name(payload: &[u8]) -> Option<String> {
    let mut r = Reader::new(payload);
    while !r.is_at_end() {
        let tag = r.read_bytes(4).ok()?;
        let len = r.read_u32().ok()? as usize;
        let field = r.read_bytes(len).ok()?;
        if tag == b"sess" {
            return decode_utf16be(field);
        }
    }
    None
}

/// True if a session's recorded duration is below `threshold_seconds` —
/// callers use this to decide whether the session file should be deleted.
pub fn is_short_session(entry_duration: u32, threshold_seconds: u32) -> bool {
    entry_duration < threshold_seconds
}

/// A session's duration for the short-session check: the sum of every
/// `oent` entry's recorded duration, since a session file can hold more
/// than one played track and a single entry's length isn't the length of
/// the listening session it belongs to.
fn total_duration(entries: &[SessionEntry]) -> u32 {
    entries.iter().filter_map(|e| e.duration).sum()
}

/// Delete every `*.session` file under `sessions_dir` whose total duration
/// is below `threshold_seconds`, then scrub the corresponding `oses` entries
/// out of `history.database` at `history_db_path`. Unreadable or
/// unparseable session files are skipped and logged, not fatal. Returns the
/// number of sessions deleted.
pub fn prune_short_sessions(
    sessions_dir: &Path,
    history_db_path: &Path,
    threshold_seconds: u32,
) -> std::io::Result<usize> {
    let entries = fs::read_dir(sessions_dir)?;

    let mut deleted_names = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("session") {
            continue;
        }

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("failed to read session {}: {e}", path.display());
                continue;
            }
        };
        let parsed = match parse_session(&bytes) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("failed to parse session {}: {e}", path.display());
                continue;
            }
        };

        if !is_short_session(total_duration(&parsed), threshold_seconds) {
            continue;
        }

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            log::warn!("session path is not valid UTF-8: {}", path.display());
            continue;
        };
        let stem = stem.to_string();

        if let Err(e) = fs::remove_file(&path) {
            log::warn!("failed to delete short session {}: {e}", path.display());
            continue;
        }
        deleted_names.push(stem);
    }

    if deleted_names.is_empty() {
        return Ok(0);
    }

    let db_bytes = fs::read(history_db_path)?;
    let scrubbed = scrub_history_database(&db_bytes, &deleted_names).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("failed to scrub {}: {e}", history_db_path.display()),
        )
    })?;
    fs::write(history_db_path, scrubbed)?;

    Ok(deleted_names.len())
}
