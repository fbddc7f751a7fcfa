//! Structured error kinds for the codec and pipeline layers (§7).
//!
//! Codec/parsing code returns [`CodecError`] so callers can match on the
//! differentiated recovery policy the spec calls for (skip a crate, abort an
//! index load, fail a session file) instead of collapsing everything into a
//! single opaque error. Orchestration-level code wraps these in
//! `anyhow::Error` via `?` the way the teacher's `commands/*.rs` wraps FFI
//! return codes.

use thiserror::Error;

/// Errors produced while parsing or repairing one of the three TLV formats.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A fixed tag (`vrsn`, `otrk`, `pfil`, ...) didn't match what the format
    /// requires at `offset`.
    #[error("format mismatch at offset {offset}: expected {expected:?}, got {actual:?}")]
    FormatMismatch {
        expected: Vec<u8>,
        actual: Vec<u8>,
        offset: usize,
    },

    /// The buffer ended in the middle of a field, as opposed to cleanly at a
    /// tag boundary (which callers may treat as "empty"/EOF, not an error).
    #[error("truncated at offset {offset}: needed {needed} more bytes, had {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A string payload was not valid UTF-16BE.
    #[error("invalid UTF-16BE string at offset {offset}")]
    InvalidString { offset: usize },
}
