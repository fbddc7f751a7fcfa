//! Index repair writer (component E): in-place `pfil` substitution with
//! cascading length-field updates.
//!
//! Operates purely on raw index bytes — it never goes through
//! [`crate::index_codec::parse`] — because a `PathFix`'s old-bytes must
//! match the on-disk `pfil` payload byte-for-byte, and re-encoding through
//! the parsed model could silently normalize something.

use crate::error::CodecError;
use crate::io_prim::Reader;

/// An ordered pair of exact byte sequences: `old` must equal a `pfil`
/// payload verbatim to match; `new` replaces it (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathFix {
    pub old_bytes: Vec<u8>,
    pub new_bytes: Vec<u8>,
}

impl PathFix {
    pub fn new(old_bytes: Vec<u8>, new_bytes: Vec<u8>) -> Self {
        PathFix { old_bytes, new_bytes }
    }
}

/// Apply `fixes` sequentially to `buf`. Each fix is looked up against the
/// buffer state left by the previous fix (offsets shift as payload lengths
/// change). A fix whose `old_bytes` has no matching `pfil` payload is
/// silently skipped. Returns the final buffer and the count of fixes that
/// were actually applied.
///
/// If a malformed block is encountered while searching for a fix's target,
/// the whole operation aborts and the function returns the *original*
/// `buf` unchanged with zero fixes applied — callers never see a partially
/// mutated buffer (§4.E failure model).
pub fn apply_fixes(buf: &[u8], fixes: &[PathFix]) -> (Vec<u8>, usize) {
    let original = buf.to_vec();
    let mut working = original.clone();
    let mut applied = 0;

    for fix in fixes {
        match apply_one_fix(&working, &fix.old_bytes, &fix.new_bytes) {
            Ok(Some(next)) => {
                working = next;
                applied += 1;
            }
            Ok(None) => {} // not found, skip
            Err(_) => return (original, 0),
        }
    }

    (working, applied)
}

/// Find the first `otrk` block containing a `pfil` field equal to `old`,
/// and return a new buffer with that field's value (and length prefix)
/// replaced, plus the enclosing `otrk` block's length field adjusted by the
/// byte delta. `Ok(None)` means no match was found (not an error).
fn apply_one_fix(buf: &[u8], old: &[u8], new: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
    let mut r = Reader::new(buf);

    r.expect_ascii(b"vrsn")?;
    r.read_bytes(2)?;
    let version_len = r.read_u16()? as usize;
    r.read_bytes(version_len)?;

    loop {
        if r.is_at_end() {
            break;
        }

        let otrk_tag_offset = r.pos();
        let tag = match r.read_bytes(4) {
            Ok(t) => t,
            Err(_) if r.pos() == otrk_tag_offset => break,
            Err(e) => return Err(e),
        };
        if tag != b"otrk" {
            return Err(CodecError::FormatMismatch {
                expected: b"otrk".to_vec(),
                actual: tag.to_vec(),
                offset: otrk_tag_offset,
            });
        }

        let otrk_len_offset = r.pos();
        let block_len = r.read_u32()? as usize;
        let payload_start = r.pos();
        let payload = r.read_bytes(block_len)?;

        if let Some(found) = find_pfil_in_payload(payload, old)? {
            let (field_len_rel_offset, field_val_rel_offset) = found;
            let abs_field_len_offset = payload_start + field_len_rel_offset;
            let abs_field_val_start = payload_start + field_val_rel_offset;
            let abs_field_val_end = abs_field_val_start + old.len();

            let delta = new.len() as i64 - old.len() as i64;
            let new_block_len = (block_len as i64 + delta) as u32;

            let mut out = Vec::with_capacity(buf.len());
            out.extend_from_slice(&buf[..otrk_len_offset]);
            out.extend_from_slice(&new_block_len.to_be_bytes());
            out.extend_from_slice(&buf[payload_start..abs_field_len_offset]);
            out.extend_from_slice(&(new.len() as u32).to_be_bytes());
            out.extend_from_slice(new);
            out.extend_from_slice(&buf[abs_field_val_end..]);
            return Ok(Some(out));
        }
    }

    Ok(None)
}

/// Scan one `otrk` payload's fields for a `pfil` whose value equals `old`
/// exactly. Returns `(length-field offset, value offset)` relative to the
/// start of `payload`.
fn find_pfil_in_payload(
    payload: &[u8],
    old: &[u8],
) -> Result<Option<(usize, usize)>, CodecError> {
    let mut r = Reader::new(payload);

    while !r.is_at_end() {
        let field_tag_offset = r.pos();
        let tag = match r.read_bytes(4) {
            Ok(t) => t,
            Err(_) if r.pos() == field_tag_offset => break,
            Err(e) => return Err(e),
        };
        let len_offset = r.pos();
        let len = r.read_u32()? as usize;
        let val_offset = r.pos();
        let val = r.read_bytes(len)?;

        if tag == b"pfil" && val == old {
            return Ok(Some((len_offset, val_offset)));
        }
    }

    Ok(None)
}
