//! Document Reducer.
//!
//! `reduce(document, action)` computes the next document together with the
//! forward patches that produce it and the inverse patches that revert it.
//! The reducer is pure: the same document and action always give the same
//! reduction. Each action is expressed as a patch list first and then run
//! through [`apply_patches`], so the forward/inverse pair is exactly what
//! gets applied locally.

use serde::{Deserialize, Serialize};
use sync_types::{Gift, Patch, PatchBatch, PatchValue};
use thiserror::Error;
use uuid::Uuid;

use crate::apply::{apply_patches, PatchError};
use crate::document::{initial_gifts, Document, FixtureError};

/// Errors raised by [`reduce`].
#[derive(Debug, Error)]
pub enum ReducerError {
    /// The action names a gift that does not exist.
    #[error("unknown gift: {id}")]
    UnknownGift {
        /// Gift id from the action
        id: String,
    },

    /// A book has no ISBN-10 to key it by.
    #[error("book {title:?} has no ISBN-10")]
    MissingIsbn {
        /// Book title
        title: String,
    },

    /// The action payload could not be decoded.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Applying the action's patches failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Bundled fixture data is broken.
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Book metadata in the OpenLibrary `jscmd=data` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Title, used as the gift description
    pub title: String,
    /// Identifier lists
    #[serde(default)]
    pub identifiers: BookIdentifiers,
    /// Cover images, if the catalogue has any
    #[serde(default)]
    pub cover: Option<BookCover>,
}

/// Book identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookIdentifiers {
    /// ISBN-10 numbers; the first one keys the gift
    #[serde(default)]
    pub isbn_10: Vec<String>,
}

/// Cover image URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookCover {
    /// Medium-sized cover, used as the gift image
    #[serde(default)]
    pub medium: String,
}

/// Everything the reducer can do to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Put an unreserved gift at `id`.
    AddGift {
        /// Gift id
        id: String,
        /// Description
        description: String,
        /// Image URL
        image: String,
    },
    /// Reserve or release a gift for the current user.
    ToggleReservation {
        /// Gift id
        id: String,
    },
    /// Add a gift built from book metadata.
    AddBook {
        /// Book metadata
        book: Book,
    },
    /// Put the gifts back to the bundled starting list.
    Reset,
    /// Apply patches verbatim.
    ApplyPatches {
        /// Patches to apply, in order
        patches: Vec<Patch>,
    },
}

impl Action {
    /// An `AddGift` with a freshly generated id.
    pub fn add_gift(description: impl Into<String>, image: impl Into<String>) -> Self {
        Self::AddGift {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            image: image.into(),
        }
    }

    /// An `ApplyPatches` carrying the given batch.
    pub fn apply(patches: PatchBatch) -> Self {
        Self::ApplyPatches {
            patches: patches.into_inner(),
        }
    }

    /// Decode an action from its JSON form.
    pub fn from_json(text: &str) -> Result<Self, ReducerError> {
        serde_json::from_str(text).map_err(|e| ReducerError::InvalidAction(e.to_string()))
    }
}

/// Output of [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    /// The document after the action
    pub document: Document,
    /// Patches that take the old document to the new one
    pub forward: PatchBatch,
    /// Patches that take the new document back to the old one
    pub inverse: PatchBatch,
}

impl Reduction {
    /// Whether the action changed nothing.
    pub fn is_noop(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Run `action` against `document`.
pub fn reduce(document: &Document, action: &Action) -> Result<Reduction, ReducerError> {
    let forward = match action {
        Action::AddGift {
            id,
            description,
            image,
        } => put_gift(document, Gift::new(id.clone(), description.clone(), image.clone())),
        Action::ToggleReservation { id } => toggle(document, id)?,
        Action::AddBook { book } => {
            let isbn = book
                .identifiers
                .isbn_10
                .first()
                .ok_or_else(|| ReducerError::MissingIsbn {
                    title: book.title.clone(),
                })?;
            let image = book.cover.as_ref().map(|c| c.medium.clone()).unwrap_or_default();
            put_gift(document, Gift::new(isbn.clone(), book.title.clone(), image))
        }
        Action::Reset => {
            let gifts = initial_gifts()?;
            if gifts == document.gifts {
                Vec::new()
            } else {
                vec![Patch::replace(["gifts"], PatchValue::Gifts(gifts))]
            }
        }
        Action::ApplyPatches { patches } => patches.clone(),
    };

    let applied = apply_patches(document, &forward)?;
    Ok(Reduction {
        document: applied.document,
        forward: PatchBatch::new(forward),
        inverse: PatchBatch::new(applied.inverse),
    })
}

fn put_gift(document: &Document, gift: Gift) -> Vec<Patch> {
    let path = ["gifts".to_string(), gift.id.clone()];
    match document.gift(&gift.id) {
        Some(existing) if *existing == gift => Vec::new(),
        Some(_) => vec![Patch::replace(path, gift)],
        None => vec![Patch::add(path, gift)],
    }
}

fn toggle(document: &Document, id: &str) -> Result<Vec<Patch>, ReducerError> {
    let gift = document
        .gift(id)
        .ok_or_else(|| ReducerError::UnknownGift { id: id.to_string() })?;
    let me = &document.current_user.id;

    let next = match gift.reserved_by.as_deref() {
        None => PatchValue::Text(me.clone()),
        Some(holder) if holder == me => PatchValue::Null,
        // Someone else holds it
        Some(_) => return Ok(Vec::new()),
    };
    Ok(vec![Patch::replace(["gifts", id, "reservedBy"], next)])
}
