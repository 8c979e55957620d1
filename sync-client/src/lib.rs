//! # sync-client
//!
//! Client library for giftsync.
//!
//! Applications use this crate to keep a local replica of the shared gift
//! list in step with every other client connected to the same relay.
//!
//! ## Features
//!
//! - **Optimistic local edits**: actions apply locally and go out as patch batches
//! - **Linear undo/redo**: inverse patches recorded per action, propagated like any edit
//! - **Book lookup**: fetch OpenLibrary metadata by ISBN and add it as a gift
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Pure core**: Uses sync-core for side-effect-free document logic
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{ClientConfig, SyncEngine, WsTransport};
//! use sync_core::Action;
//! use sync_types::User;
//!
//! let config = ClientConfig::from_env(User::new("1", "Bob"))?;
//! let engine = SyncEngine::new(config, WsTransport::new())?;
//! engine.connect().await?;
//!
//! engine.dispatch(Action::ToggleReservation { id: "coffee_mug".into() }, true).await?;
//!
//! // Apply what other clients send
//! loop {
//!     engine.receive().await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod books;
pub mod engine;
pub mod transport;

pub use books::{BookLookup, BookLookupConfig, OPENLIBRARY_URL};
pub use engine::{ClientConfig, ClientError, SyncEngine, DEFAULT_RELAY_URL};
pub use transport::{MockTransport, Transport, TransportError, WsTransport, WsTransportConfig};
