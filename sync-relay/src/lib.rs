//! # sync-relay
//!
//! Broadcast relay for giftsync.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections from gift list clients
//! - Appends every valid patch batch to a shared, ordered patch log
//! - Forwards each batch verbatim to every other live connection
//! - Sends the whole log, flattened, to each new connection
//! - Periodically compacts the log into an equivalent, shorter one
//!
//! ## Architecture
//!
//! ```text
//! Client A ──┐                      ┌── Client B
//!            │      WebSocket       │
//!            ├─────────────────────►│
//!            │                      │
//!        ┌───┴──────────────────────┴───┐
//!        │         sync-relay           │
//!        │  ┌────────────────────────┐  │
//!        │  │ PatchLog + live peers  │  │
//!        │  └────────────────────────┘  │
//!        │        ▲ compactor           │
//!        └──────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Every frame in either direction is a JSON array of patches. There is no
//! handshake: the first frame a client receives is the flattened log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compactor;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod patch_log;
pub mod protocol;
pub mod server;
pub mod session;

pub use compactor::{CompactionOutcome, Compactor};
pub use config::Config;
pub use error::{CompactionError, ProtocolError, RelayError};
pub use patch_log::PatchLog;
pub use server::{ConnectionId, PatchRelay, RelayServer, RunningRelay};
