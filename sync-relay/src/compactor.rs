//! Background compaction of the patch log.
//!
//! Runs periodically. Each cycle takes a mark, a copy of the log and the
//! relay's head document under the lock, replays the batches added since
//! the previous cycle from a cached checkpoint outside the lock, checks the
//! replay reaches that head, and swaps the marked prefix for at most one
//! equivalent batch. Batches that arrive while a cycle runs stay
//! at the tail and are picked up by the next cycle.

use crate::config::CompactionConfig;
use crate::error::CompactionError;
use crate::server::{PatchRelay, RelayMetrics};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{compact, Document};
use sync_types::PatchBatch;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

/// What a compaction cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Another cycle was still running.
    Skipped,
    /// Nothing was appended since the last cycle.
    Unchanged,
    /// The log was rewritten.
    Compacted {
        /// Batches covered by the mark.
        before: usize,
        /// Batches that replaced them.
        after: usize,
    },
}

/// Where the previous cycle left off.
#[derive(Debug)]
struct Checkpoint {
    /// Document reached by replaying `prefix` batches from the base
    document: Document,
    /// Number of leading log batches already in compacted form
    prefix: usize,
}

/// Compacts one relay's log.
#[derive(Debug)]
pub struct Compactor {
    relay: Arc<PatchRelay>,
    checkpoint: Mutex<Checkpoint>,
}

impl Compactor {
    /// Create a compactor starting from the relay's base document.
    pub fn new(relay: Arc<PatchRelay>) -> Self {
        let checkpoint = Checkpoint {
            document: relay.base().clone(),
            prefix: 0,
        };
        Self {
            relay,
            checkpoint: Mutex::new(checkpoint),
        }
    }

    /// Run one cycle now, unless one is already running.
    pub async fn compact_now(&self) -> Result<CompactionOutcome, CompactionError> {
        let result = self.run_cycle().await;
        let metrics = self.relay.metrics();
        match &result {
            Ok(CompactionOutcome::Compacted { .. }) => RelayMetrics::incr(&metrics.compactions_total),
            Err(_) => RelayMetrics::incr(&metrics.compaction_failures),
            Ok(_) => {}
        }
        result
    }

    async fn run_cycle(&self) -> Result<CompactionOutcome, CompactionError> {
        let Ok(mut checkpoint) = self.checkpoint.try_lock() else {
            return Ok(CompactionOutcome::Skipped);
        };

        let (mark, snapshot, head) = self.relay.mark_log().await;
        if snapshot.len() <= checkpoint.prefix {
            return Ok(CompactionOutcome::Unchanged);
        }

        let budget = snapshot.iter().map(PatchBatch::len).sum();
        let result = compact(
            self.relay.base(),
            &checkpoint.document,
            &snapshot[checkpoint.prefix..],
            budget,
        )?;

        if result.document != head {
            return Err(CompactionError::Diverged);
        }

        let document = result.document.clone();
        let batches = result.into_batches();
        let after = batches.len();
        self.relay.replace_log(mark, batches).await?;

        checkpoint.document = document;
        checkpoint.prefix = after;
        Ok(CompactionOutcome::Compacted {
            before: mark.len(),
            after,
        })
    }
}

/// Spawn the periodic compaction task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_compaction_task(
    compactor: Arc<Compactor>,
    config: CompactionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Compaction task disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!("Compaction task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        timer.tick().await;

        loop {
            timer.tick().await;

            match compactor.compact_now().await {
                Ok(CompactionOutcome::Compacted { before, after }) => {
                    tracing::info!("Compaction: {} batches -> {}", before, after);
                }
                Ok(outcome) => {
                    tracing::debug!("Compaction: {:?}", outcome);
                }
                Err(e) => {
                    tracing::error!("Compaction cycle abandoned: {}", e);
                }
            }
            compactor.relay.rate_limits().shrink();
        }
    })
}
