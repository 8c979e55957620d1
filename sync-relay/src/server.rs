//! Broadcast relay and server lifecycle.
//!
//! [`PatchRelay`] owns the patch log and the set of live connections behind
//! a single lock. Registering a connection, appending a batch, fanning it
//! out, and rewriting the log during compaction all happen under the write
//! lock, so a joiner's snapshot and the batches queued after it never miss
//! or reorder anything.
//!
//! Each connection has a bounded outbound queue drained by its own writer
//! task. Fan-out never awaits a peer: a full or closed queue gets the peer
//! dropped instead.

use crate::compactor::{spawn_compaction_task, Compactor};
use crate::config::Config;
use crate::error::{ProtocolError, ProtocolResult, RelayError};
use crate::http;
use crate::limits::RateLimits;
use crate::patch_log::{LogMark, PatchLog};
use crate::protocol;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sync_core::{apply_patches, Document};
use sync_types::{PatchBatch, User};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identifier of one live connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections registered.
    pub connections_total: AtomicU64,
    /// Batches appended to the log.
    pub batches_accepted: AtomicU64,
    /// Batches refused as malformed, oversized or not applicable to the log.
    pub batches_rejected: AtomicU64,
    /// Frames queued to receivers.
    pub batches_relayed: AtomicU64,
    /// Bytes of accepted frames.
    pub bytes_received: AtomicU64,
    /// Peers dropped because their queue was full or closed.
    pub delivery_failures: AtomicU64,
    /// Compaction cycles that rewrote the log.
    pub compactions_total: AtomicU64,
    /// Compaction cycles abandoned after an error.
    pub compaction_failures: AtomicU64,
    /// Connection attempts refused by the per-IP limit.
    pub rate_limit_hits: AtomicU64,
}

impl RelayMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The receiving side of a registered connection.
#[derive(Debug)]
pub struct PeerHandle {
    /// Id to pass to [`PatchRelay::on_message`] and [`PatchRelay::on_disconnect`].
    pub id: ConnectionId,
    /// Frames to write to the socket, starting with the join snapshot.
    pub outbound: mpsc::Receiver<String>,
}

#[derive(Debug)]
struct Peer {
    tx: mpsc::Sender<String>,
    addr: Option<SocketAddr>,
}

#[derive(Debug)]
struct RelayState {
    log: PatchLog,
    /// The base with every logged batch applied
    head: Document,
    peers: BTreeMap<ConnectionId, Peer>,
}

impl RelayState {
    /// Drop `id` from the live set; returns whether it was there.
    fn remove_peer(&mut self, id: ConnectionId) -> bool {
        self.peers.remove(&id).is_some()
    }
}

/// The broadcast relay.
pub struct PatchRelay {
    config: Config,
    base: Document,
    state: RwLock<RelayState>,
    rate_limits: RateLimits,
    metrics: RelayMetrics,
    next_id: AtomicU64,
    started: Instant,
}

impl fmt::Debug for PatchRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl PatchRelay {
    /// Create a relay with an empty log over the bundled base document.
    pub fn new(config: Config) -> Result<Self, RelayError> {
        let rate_limits = RateLimits::new(&config.limits);
        let base = Document::seed(User::new("relay", "relay"))?;
        let state = RelayState {
            log: PatchLog::new(),
            head: base.clone(),
            peers: BTreeMap::new(),
        };
        Ok(Self {
            config,
            base,
            state: RwLock::new(state),
            rate_limits,
            metrics: RelayMetrics::default(),
            next_id: AtomicU64::new(1),
            started: Instant::now(),
        })
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The document every log replay starts from.
    pub fn base(&self) -> &Document {
        &self.base
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Time since the relay was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Register a new connection and queue the join snapshot as its first frame.
    pub async fn on_connect(&self, addr: Option<SocketAddr>) -> ProtocolResult<PeerHandle> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, outbound) = mpsc::channel(self.config.limits.outbound_queue.max(1));

        let mut state = self.state.write().await;
        let snapshot = protocol::encode_snapshot(&state.log.flattened())?;
        // Fresh queue with capacity >= 1, so this cannot be full
        tx.try_send(snapshot)
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        state.peers.insert(id, Peer { tx, addr });
        let live = state.peers.len();
        drop(state);

        RelayMetrics::incr(&self.metrics.connections_total);
        info!(%id, ?addr, live, "connection registered");
        Ok(PeerHandle { id, outbound })
    }

    /// Accept a frame from `from`, append it, and queue it verbatim to every
    /// other live connection.
    ///
    /// A batch must apply to the current head of the log; one that does not
    /// (it edits a gift another client removed first) is rejected like a
    /// malformed one. Returns the number of connections the frame was queued
    /// to. A rejected frame leaves the log and every connection untouched.
    pub async fn on_message(&self, from: ConnectionId, frame: &str) -> ProtocolResult<usize> {
        let batch = match protocol::parse_frame(frame, self.config.limits.max_message_size) {
            Ok(batch) => batch,
            Err(e) => {
                RelayMetrics::incr(&self.metrics.batches_rejected);
                return Err(e);
            }
        };
        let patches = batch.len();

        let mut state = self.state.write().await;
        if !state.peers.contains_key(&from) {
            return Err(ProtocolError::ConnectionClosed);
        }
        let head = match apply_patches(&state.head, batch.patches()) {
            Ok(applied) => applied.document,
            Err(e) => {
                drop(state);
                RelayMetrics::incr(&self.metrics.batches_rejected);
                return Err(ProtocolError::MalformedPatchBatch {
                    reason: format!("does not apply to the log: {e}"),
                });
            }
        };
        state.log.append(batch)?;
        state.head = head;

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, peer) in state.peers.iter().filter(|(id, _)| **id != from) {
            match peer.tx.try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => dead.push((*id, peer.addr, e.to_string())),
            }
        }
        for (id, addr, reason) in dead {
            state.remove_peer(id);
            RelayMetrics::incr(&self.metrics.delivery_failures);
            warn!(%id, ?addr, %reason, "dropping connection that cannot keep up");
        }
        let log_len = state.log.len();
        drop(state);

        RelayMetrics::incr(&self.metrics.batches_accepted);
        self.metrics
            .batches_relayed
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.metrics
            .bytes_received
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        debug!(%from, patches, delivered, log_len, "batch relayed");
        Ok(delivered)
    }

    /// Unregister a connection. Safe to call more than once.
    pub async fn on_disconnect(&self, id: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        let removed = state.remove_peer(id);
        let live = state.peers.len();
        drop(state);

        if removed {
            info!(%id, live, "connection unregistered");
        }
        removed
    }

    /// Drop every connection; their writers finish and close the sockets.
    pub async fn disconnect_all(&self) -> usize {
        let mut state = self.state.write().await;
        let count = state.peers.len();
        state.peers.clear();
        count
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.peers.len()
    }

    /// Check if `id` is still registered.
    pub async fn is_connected(&self, id: ConnectionId) -> bool {
        self.state.read().await.peers.contains_key(&id)
    }

    /// Ordered copy of the log.
    pub async fn log_snapshot(&self) -> Vec<PatchBatch> {
        self.state.read().await.log.snapshot()
    }

    /// The log flattened into one batch, as sent to joiners.
    pub async fn flattened_log(&self) -> PatchBatch {
        self.state.read().await.log.flattened()
    }

    /// Number of batches and patches in the log.
    pub async fn log_size(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.log.len(), state.log.patch_count())
    }

    /// The base with every logged batch applied.
    pub async fn head(&self) -> Document {
        self.state.read().await.head.clone()
    }

    /// Capture a mark, a consistent copy of the log, and the head it leads to.
    pub(crate) async fn mark_log(&self) -> (LogMark, Vec<PatchBatch>, Document) {
        let state = self.state.read().await;
        (state.log.mark(), state.log.snapshot(), state.head.clone())
    }

    /// Swap the marked prefix of the log for `batches`.
    pub(crate) async fn replace_log(
        &self,
        mark: LogMark,
        batches: Vec<PatchBatch>,
    ) -> Result<(), crate::error::CompactionError> {
        self.state.write().await.log.replace(mark, batches)
    }
}

/// Entry point for running a relay.
#[derive(Debug)]
pub struct RelayServer;

impl RelayServer {
    /// Validate `config`, bind the listener, and start serving.
    pub async fn start(config: Config) -> Result<RunningRelay, RelayError> {
        config.validate()?;

        let relay = Arc::new(PatchRelay::new(config.clone())?);
        let compactor = Arc::new(Compactor::new(relay.clone()));

        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = http::build_router(relay.clone());
        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        let compaction = spawn_compaction_task(compactor.clone(), config.compaction.clone());

        info!(%local_addr, "relay listening");
        Ok(RunningRelay {
            local_addr,
            relay,
            compactor,
            shutdown: Some(shutdown_tx),
            server,
            compaction,
        })
    }
}

/// A started relay. Dropping it without [`RunningRelay::stop`] leaves the
/// tasks running until the runtime shuts down.
#[derive(Debug)]
pub struct RunningRelay {
    local_addr: SocketAddr,
    relay: Arc<PatchRelay>,
    compactor: Arc<Compactor>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<std::io::Result<()>>,
    compaction: JoinHandle<()>,
}

impl RunningRelay {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL clients connect to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// The relay state.
    pub fn relay(&self) -> &Arc<PatchRelay> {
        &self.relay
    }

    /// The compactor driving this relay's log.
    pub fn compactor(&self) -> &Arc<Compactor> {
        &self.compactor
    }

    /// Stop accepting, close every connection, and wait for the server task.
    pub async fn stop(mut self) -> Result<(), RelayError> {
        self.compaction.abort();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let closed = self.relay.disconnect_all().await;
        info!(closed, "relay stopping");

        match tokio::time::timeout(Duration::from_secs(5), &mut self.server).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => warn!("server task failed: {}", e),
            Err(_) => {
                warn!("server did not drain in time; aborting");
                self.server.abort();
            }
        }
        Ok(())
    }
}
