//! The relay's append-only patch log.
//!
//! Batches are kept exactly as accepted, in arrival order. The only way to
//! remove anything is [`PatchLog::replace`], which swaps a prefix captured
//! by [`PatchLog::mark`] for its compacted form while keeping every batch
//! appended after the mark.

use sync_types::{PatchBatch, TypesError};

use crate::error::CompactionError;

/// A prefix of the log as seen at some point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMark {
    generation: u64,
    len: usize,
}

impl LogMark {
    /// Number of batches covered.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the mark covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Ordered history of accepted patch batches.
#[derive(Debug, Default)]
pub struct PatchLog {
    batches: Vec<PatchBatch>,
    /// Bumped on every replace
    generation: u64,
}

impl PatchLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `batch` and push it at the tail.
    pub fn append(&mut self, batch: PatchBatch) -> Result<(), TypesError> {
        batch.validate()?;
        self.batches.push(batch);
        Ok(())
    }

    /// Ordered copy of every batch.
    pub fn snapshot(&self) -> Vec<PatchBatch> {
        self.batches.clone()
    }

    /// Every patch, in order, as one batch (the join snapshot).
    pub fn flattened(&self) -> PatchBatch {
        PatchBatch::flatten(&self.batches)
    }

    /// Capture the current prefix for a later [`PatchLog::replace`].
    pub fn mark(&self) -> LogMark {
        LogMark {
            generation: self.generation,
            len: self.batches.len(),
        }
    }

    /// Swap the prefix covered by `mark` for `batches`.
    ///
    /// Batches appended after the mark stay at the tail in order.
    pub fn replace(&mut self, mark: LogMark, batches: Vec<PatchBatch>) -> Result<(), CompactionError> {
        if mark.generation != self.generation {
            return Err(CompactionError::Stale {
                expected: mark.generation,
                actual: self.generation,
            });
        }
        if mark.len > self.batches.len() {
            return Err(CompactionError::MarkOutOfRange {
                mark: mark.len,
                len: self.batches.len(),
            });
        }

        self.batches.splice(..mark.len, batches);
        self.generation += 1;
        Ok(())
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total number of patches across all batches.
    pub fn patch_count(&self) -> usize {
        self.batches.iter().map(PatchBatch::len).sum()
    }
}
