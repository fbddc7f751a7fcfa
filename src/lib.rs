//! Core library for syncing a filesystem tree of media files into a DJ
//! application's on-disk library, and repairing/deduplicating its index and
//! crate files.
//!
//! This crate is the binary-format stack and sync/repair pipeline only
//! (§1): the GUI shell, configuration-file loading, log-file rotation, and
//! the top-level CLI dispatch are collaborators that sit outside it and are
//! specified here only by the interfaces they use — [`logger::Logger`] and
//! [`config::SyncConfig`].

pub mod backup;
pub mod config;
pub mod counters;
pub mod crate_codec;
pub mod crate_fixer;
pub mod crate_tree;
pub mod dupe_mover;
pub mod error;
pub mod index_codec;
pub mod index_repair;
pub mod io_prim;
pub mod logger;
pub mod orchestrator;
pub mod path_norm;
pub mod scanner;
pub mod session_codec;
pub mod sidebar;
pub mod smart_writer;
pub mod track_index;
