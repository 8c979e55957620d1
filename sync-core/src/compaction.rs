//! Patch log compaction.
//!
//! A log of batches `B1..Bn` over a base document is rewritten into at most
//! one batch whose replay from the base gives the same document. The
//! rewritten batch is the structural diff between the base and the replayed
//! result, falling back to a single whole-collection `replace` when the diff
//! would hold more patches than the input did. Compaction therefore never
//! grows the log, in entries or in patches.

use sync_types::{Patch, PatchBatch, PatchValue};

use crate::apply::{apply_patches, PatchError};
use crate::diff::diff;
use crate::Document;

/// Result of compacting a run of batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    /// Document reached by replaying the input
    pub document: Document,
    /// Minimal patches taking the base to `document`
    pub patches: Vec<Patch>,
}

impl Compaction {
    /// The compacted log: one batch, or none if nothing changed.
    pub fn into_batches(self) -> Vec<PatchBatch> {
        if self.patches.is_empty() {
            Vec::new()
        } else {
            vec![PatchBatch::new(self.patches)]
        }
    }
}

/// Replay `batches` onto `start` and express the outcome relative to `base`.
///
/// `start` is the document already reached from `base` by an earlier,
/// compacted prefix of the log (or `base` itself). `budget` caps the number
/// of patches in the output; pass the flattened patch count of the whole
/// run being replaced.
pub fn compact(
    base: &Document,
    start: &Document,
    batches: &[PatchBatch],
    budget: usize,
) -> Result<Compaction, PatchError> {
    let mut document = start.clone();
    for batch in batches {
        document = apply_patches(&document, batch.patches())?.document;
    }

    let mut patches = diff(base, &document);
    if patches.len() > budget {
        patches = vec![Patch::replace(
            ["gifts"],
            PatchValue::Gifts(document.gifts.clone()),
        )];
    }

    Ok(Compaction { document, patches })
}

/// Compact a whole log over `base`.
pub fn compact_log(base: &Document, batches: &[PatchBatch]) -> Result<Compaction, PatchError> {
    let budget = batches.iter().map(PatchBatch::len).sum();
    compact(base, base, batches, budget)
}
