//! # sync-core
//!
//! Pure logic for giftsync (no I/O, instant tests).
//!
//! This crate implements the document model and every algorithm that acts
//! on it without any network or disk I/O:
//! - [`apply_patches`] applies a patch sequence and yields its inverse
//! - [`diff`] produces the patches that take one document to another
//! - [`reduce`] is the Document Reducer: `(document, action) -> (document, forward, inverse)`
//! - [`UndoHistory`] is the linear undo/redo stack of patch pairs
//! - [`compact`] rewrites a patch log into a minimal equivalent one
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - same input, same output, no
//! hidden counters. The relay and the client perform the actual I/O and
//! call into these functions while holding their own locks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apply;
pub mod compaction;
pub mod diff;
pub mod document;
pub mod history;
pub mod reducer;

pub use apply::{apply_patches, Applied, PatchError};
pub use compaction::{compact, compact_log, Compaction};
pub use diff::diff;
pub use document::{Document, FixtureError};
pub use history::{UndoEntry, UndoHistory};
pub use reducer::{reduce, Action, Book, BookCover, BookIdentifiers, Reduction, ReducerError};
