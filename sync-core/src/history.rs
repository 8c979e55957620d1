//! Linear undo history.
//!
//! Entries are ordered oldest first. `position` counts the entries that are
//! currently applied: 0 means "before the first entry", `len()` means "at
//! the top". Recording a new entry drops everything above the position.
//!
//! The history only tracks bookkeeping. Callers look up the entry with
//! [`UndoHistory::pending_undo`] / [`UndoHistory::pending_redo`], apply it,
//! and only then move the position with [`UndoHistory::seek_back`] /
//! [`UndoHistory::seek_forward`], so a failed application leaves the
//! position where it was.

use std::collections::VecDeque;
use sync_types::PatchBatch;

/// A forward/inverse pair recorded for one undoable action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    /// Patches the action applied
    pub forward: PatchBatch,
    /// Patches that revert it
    pub inverse: PatchBatch,
}

/// Ordered undo entries plus a pointer.
#[derive(Debug, Clone, Default)]
pub struct UndoHistory {
    entries: VecDeque<UndoEntry>,
    position: usize,
    capacity: Option<usize>,
}

impl UndoHistory {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// History that keeps at most `capacity` entries, dropping the oldest.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            position: 0,
            capacity: Some(capacity),
        }
    }

    /// Record a new entry at the pointer, discarding any redo entries.
    pub fn record(&mut self, entry: UndoEntry) {
        self.entries.truncate(self.position);
        self.entries.push_back(entry);
        self.position += 1;

        if let Some(cap) = self.capacity {
            while self.entries.len() > cap {
                self.entries.pop_front();
                self.position -= 1;
            }
        }
    }

    /// The entry an undo would revert.
    pub fn pending_undo(&self) -> Option<&UndoEntry> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
    }

    /// The entry a redo would reapply.
    pub fn pending_redo(&self) -> Option<&UndoEntry> {
        self.entries.get(self.position)
    }

    /// Move the pointer back after an undo was applied.
    pub fn seek_back(&mut self) -> bool {
        if self.position == 0 {
            return false;
        }
        self.position -= 1;
        true
    }

    /// Move the pointer forward after a redo was applied.
    pub fn seek_forward(&mut self) -> bool {
        if self.position >= self.entries.len() {
            return false;
        }
        self.position += 1;
        true
    }

    /// Check if there is anything to undo.
    pub fn can_undo(&self) -> bool {
        self.position > 0
    }

    /// Check if there is anything to redo.
    pub fn can_redo(&self) -> bool {
        self.position < self.entries.len()
    }

    /// Number of applied entries.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of entries, applied or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = 0;
    }
}
