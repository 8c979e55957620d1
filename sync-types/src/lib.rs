//! # sync-types
//!
//! Wire format types for the giftsync patch relay.
//!
//! Every message on the wire, in both directions, is a JSON array of
//! patch objects:
//!
//! ```text
//! [{ "op": "add", "path": ["gifts", "g1"], "value": { ... } },
//!  { "op": "replace", "path": ["gifts", "g1", "reservedBy"], "value": "u1" }]
//! ```
//!
//! This crate provides:
//! - [`Patch`], [`PatchOp`], [`PathSegment`], [`PatchValue`] - a single structural change
//! - [`PatchBatch`] - the ordered unit of transmission and of log entries
//! - [`Gift`], [`User`] - the record types carried inside patch values
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod gift;
mod patch;

pub use error::TypesError;
pub use gift::{Gift, User};
pub use patch::{Patch, PatchBatch, PatchOp, PathSegment, PatchValue};
