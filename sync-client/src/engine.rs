//! SyncEngine - the client side of giftsync.
//!
//! The engine keeps a local replica of the shared document plus the undo
//! history, turns actions into patch batches with the reducer from
//! sync-core, and exchanges those batches with the relay over a
//! [`Transport`].
//!
//! ```text
//! Application → SyncEngine → Transport → Relay
//!                   ↓
//!              sync-core (reduce, apply, undo history)
//! ```
//!
//! Every operation that touches the replica holds its lock for the whole
//! operation, including the network send, so local actions, undo/redo and
//! remote batches never interleave. [`SyncEngine::receive`] waits for the
//! next frame without the lock and only takes it to apply the batch.
//!
//! # Example
//!
//! ```ignore
//! use sync_client::{ClientConfig, SyncEngine, WsTransport};
//! use sync_core::Action;
//!
//! let engine = SyncEngine::new(ClientConfig::from_env(me)?, WsTransport::new())?;
//! engine.connect().await?;
//! engine.dispatch(Action::add_gift("Mug", "x.png"), true).await?;
//! engine.undo().await?;
//! ```

use sync_core::{reduce, Action, Document, FixtureError, ReducerError, UndoEntry, UndoHistory};
use sync_types::{PatchBatch, TypesError, User};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::books::BookLookup;
use crate::transport::{Transport, TransportError};

/// Environment variable holding the relay port.
pub const PORT_ENV: &str = "WEBSOCKET_PORT";

/// Relay address used when nothing else is configured.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:5001";

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The reducer refused the action or a batch did not apply.
    #[error("reducer error: {0}")]
    Reducer(#[from] ReducerError),

    /// Bundled fixture data is broken.
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    /// A frame from the relay could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(#[from] TypesError),

    /// Book lookup failed.
    #[error("book lookup failed: {0}")]
    Lookup(#[from] reqwest::Error),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Configuration for SyncEngine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL (`ws://host:port`).
    pub relay_url: String,
    /// The user this client acts as.
    pub user: User,
}

impl ClientConfig {
    /// Create a configuration for `user` talking to `relay_url`.
    pub fn new(relay_url: impl Into<String>, user: User) -> Self {
        Self {
            relay_url: relay_url.into(),
            user,
        }
    }

    /// Build the configuration from `WEBSOCKET_PORT`, relay on localhost.
    pub fn from_env(user: User) -> Result<Self, ClientError> {
        Self::from_lookup(user, |key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(user: User, lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let relay_url = match lookup(PORT_ENV) {
            Some(raw) => {
                let port: u16 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ClientError::Config(format!("{PORT_ENV}={raw:?} is not a port")))?;
                format!("ws://localhost:{port}")
            }
            None => DEFAULT_RELAY_URL.to_string(),
        };
        Ok(Self::new(relay_url, user))
    }
}

#[derive(Debug)]
struct Replica {
    document: Document,
    history: UndoHistory,
}

/// Client synchronization engine.
pub struct SyncEngine<T: Transport> {
    config: ClientConfig,
    transport: T,
    replica: Mutex<Replica>,
}

impl<T: Transport> SyncEngine<T> {
    /// Create an engine whose replica starts from the bundled gift list.
    pub fn new(config: ClientConfig, transport: T) -> Result<Self, ClientError> {
        Self::with_history(config, transport, UndoHistory::new())
    }

    /// Create an engine with a custom (e.g. bounded) undo history.
    pub fn with_history(
        config: ClientConfig,
        transport: T,
        history: UndoHistory,
    ) -> Result<Self, ClientError> {
        let document = Document::seed(config.user.clone())?;
        Ok(Self {
            config,
            transport,
            replica: Mutex::new(Replica { document, history }),
        })
    }

    /// Connect to the relay and load its history.
    ///
    /// The first frame the relay sends is the whole flattened log; the
    /// replica is rebuilt from the bundled base with it and the undo history
    /// starts empty.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut replica = self.replica.lock().await;

        self.transport.connect(&self.config.relay_url).await?;
        let frame = self.transport.recv().await?;
        // An empty log arrives as `[]`, which a regular batch may not be
        let snapshot = PatchBatch::from_json_unchecked(&frame)?;

        let base = Document::seed(self.config.user.clone())?;
        let document = reduce(&base, &Action::apply(snapshot.clone()))?.document;
        replica.document = document;
        replica.history.clear();

        info!(
            "Connected to {} ({} patches of history)",
            self.config.relay_url,
            snapshot.len()
        );
        Ok(())
    }

    /// Check if the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close the connection to the relay.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.transport.close().await?;
        Ok(())
    }

    /// Run `action` locally and send its patches to the relay.
    ///
    /// Non-empty forward batches are always sent; `undoable` only decides
    /// whether the action lands in the local undo history. If the reducer
    /// or the send fails, the replica is left as it was.
    ///
    /// Returns the forward batch.
    pub async fn dispatch(&self, action: Action, undoable: bool) -> Result<PatchBatch, ClientError> {
        let mut replica = self.replica.lock().await;
        self.dispatch_locked(&mut replica, &action, undoable).await
    }

    /// Look `isbn` up and add the book as a gift.
    ///
    /// Returns `false` when the catalogue has no such book. The replica is
    /// only touched once the lookup has produced a book.
    pub async fn add_book(
        &self,
        lookup: &BookLookup,
        isbn: &str,
        undoable: bool,
    ) -> Result<bool, ClientError> {
        let Some(book) = lookup.fetch_book(isbn).await? else {
            warn!(isbn, "No book found");
            return Ok(false);
        };
        self.dispatch(Action::AddBook { book }, undoable).await?;
        Ok(true)
    }

    async fn dispatch_locked(
        &self,
        replica: &mut Replica,
        action: &Action,
        undoable: bool,
    ) -> Result<PatchBatch, ClientError> {
        let reduction = reduce(&replica.document, action)?;

        if reduction.forward.is_empty() {
            debug!("Action changed nothing, not sending");
        } else {
            let frame = reduction.forward.to_json()?;
            self.transport.send(&frame).await?;
        }

        if undoable {
            replica.history.record(UndoEntry {
                forward: reduction.forward.clone(),
                inverse: reduction.inverse,
            });
        }
        replica.document = reduction.document;
        Ok(reduction.forward)
    }

    /// Revert the most recent undoable action.
    ///
    /// Returns `false` if there was nothing to undo.
    pub async fn undo(&self) -> Result<bool, ClientError> {
        let mut replica = self.replica.lock().await;
        let Some(entry) = replica.history.pending_undo() else {
            return Ok(false);
        };

        let action = Action::apply(entry.inverse.clone());
        self.dispatch_locked(&mut replica, &action, false).await?;
        replica.history.seek_back();
        Ok(true)
    }

    /// Reapply the most recently undone action.
    ///
    /// Returns `false` if there was nothing to redo.
    pub async fn redo(&self) -> Result<bool, ClientError> {
        let mut replica = self.replica.lock().await;
        let Some(entry) = replica.history.pending_redo() else {
            return Ok(false);
        };

        let action = Action::apply(entry.forward.clone());
        self.dispatch_locked(&mut replica, &action, false).await?;
        replica.history.seek_forward();
        Ok(true)
    }

    /// Apply a batch that came from another client.
    ///
    /// Remote changes never enter the undo history.
    pub async fn on_remote_patches(&self, batch: PatchBatch) -> Result<(), ClientError> {
        let mut replica = self.replica.lock().await;
        let reduction = reduce(&replica.document, &Action::apply(batch))?;
        replica.document = reduction.document;
        Ok(())
    }

    /// Wait for the next batch from the relay and apply it.
    ///
    /// Returns the batch that was applied. A batch that does not apply to
    /// the replica is reported and leaves the replica unchanged.
    pub async fn receive(&self) -> Result<PatchBatch, ClientError> {
        let frame = self.transport.recv().await?;
        let batch = PatchBatch::from_json(&frame)?;

        if let Err(e) = self.on_remote_patches(batch.clone()).await {
            warn!("Dropping remote batch: {}", e);
            return Err(e);
        }
        debug!("Applied remote batch of {} patches", batch.len());
        Ok(batch)
    }

    /// A copy of the current replica.
    pub async fn document(&self) -> Document {
        self.replica.lock().await.document.clone()
    }

    /// Check if there is anything to undo.
    pub async fn can_undo(&self) -> bool {
        self.replica.lock().await.history.can_undo()
    }

    /// Check if there is anything to redo.
    pub async fn can_redo(&self) -> bool {
        self.replica.lock().await.history.can_redo()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
