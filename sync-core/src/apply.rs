//! Patch application.
//!
//! Patches are applied one at a time, in order, each resolving its path
//! against the document as left by the previous patch. Application is
//! all-or-nothing: the input document is never modified, and on the first
//! failing patch the whole sequence is rejected.
//!
//! Supported targets:
//!
//! | Path                        | add / replace         | remove            |
//! |-----------------------------|-----------------------|-------------------|
//! | `gifts`                     | whole gifts map       | rejected          |
//! | `gifts/<id>`                | gift record           | delete (if any)   |
//! | `gifts/<id>/reservedBy`     | user id or `null`     | clear reservation |
//! | `gifts/<id>/<text field>`   | string                | rejected          |
//!
//! `users` is read-only and `currentUser` is never replicated.

use std::collections::BTreeMap;
use sync_types::{Gift, Patch, PatchOp, PatchValue, PathSegment};
use thiserror::Error;

use crate::Document;

/// Errors raised while applying a patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The patch is missing required fields for its op.
    #[error("malformed patch: {0}")]
    Malformed(String),

    /// A parent along the path does not exist.
    #[error("path {path} does not resolve")]
    Unresolved {
        /// Offending path.
        path: String,
    },

    /// The path names read-only reference data.
    #[error("path {path} is read-only")]
    ReadOnly {
        /// Offending path.
        path: String,
    },

    /// The path names per-client state.
    #[error("path {path} is local to each client and not replicated")]
    NotReplicated {
        /// Offending path.
        path: String,
    },

    /// The path does not name anything in the document.
    #[error("unsupported path {path}")]
    UnsupportedPath {
        /// Offending path.
        path: String,
    },

    /// The target cannot be removed.
    #[error("{path} cannot be removed")]
    NotRemovable {
        /// Offending path.
        path: String,
    },

    /// The value does not fit the target.
    #[error("{op} at {path} expects {expected}")]
    InvalidValue {
        /// Patch op.
        op: PatchOp,
        /// Offending path.
        path: String,
        /// What the target accepts.
        expected: &'static str,
    },
}

/// Result of a successful application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The document after every patch.
    pub document: Document,
    /// Patches that undo the application, in the order to apply them.
    pub inverse: Vec<Patch>,
}

/// Apply `patches` to `document`, returning the new document and the inverse patches.
pub fn apply_patches(document: &Document, patches: &[Patch]) -> Result<Applied, PatchError> {
    let mut next = document.clone();
    let mut inverse = Vec::with_capacity(patches.len());

    for patch in patches {
        patch
            .validate()
            .map_err(|e| PatchError::Malformed(e.to_string()))?;
        if let Some(undo) = apply_one(&mut next, patch)? {
            inverse.push(undo);
        }
    }

    inverse.reverse();
    Ok(Applied {
        document: next,
        inverse,
    })
}

/// Apply a single validated patch in place and return its inverse.
///
/// `None` means the patch changed nothing (removing an absent gift).
fn apply_one(doc: &mut Document, patch: &Patch) -> Result<Option<Patch>, PatchError> {
    match patch.path.first().and_then(PathSegment::as_key) {
        Some("gifts") => apply_to_gifts(&mut doc.gifts, patch),
        Some("users") => Err(PatchError::ReadOnly {
            path: patch.display_path(),
        }),
        Some("currentUser") => Err(PatchError::NotReplicated {
            path: patch.display_path(),
        }),
        _ => Err(unsupported(patch)),
    }
}

fn apply_to_gifts(
    gifts: &mut BTreeMap<String, Gift>,
    patch: &Patch,
) -> Result<Option<Patch>, PatchError> {
    match &patch.path[1..] {
        [] => replace_collection(gifts, patch).map(Some),
        [id] => {
            let id = id.as_key().ok_or_else(|| unsupported(patch))?;
            apply_to_gift(gifts, id, patch)
        }
        [id, field] => {
            let id = id.as_key().ok_or_else(|| unsupported(patch))?;
            let field = field.as_key().ok_or_else(|| unsupported(patch))?;
            let gift = gifts.get_mut(id).ok_or_else(|| PatchError::Unresolved {
                path: patch.display_path(),
            })?;
            apply_to_field(gift, field, patch).map(Some)
        }
        _ => Err(unsupported(patch)),
    }
}

fn replace_collection(
    gifts: &mut BTreeMap<String, Gift>,
    patch: &Patch,
) -> Result<Patch, PatchError> {
    match (patch.op, &patch.value) {
        (PatchOp::Remove, _) => Err(PatchError::NotRemovable {
            path: patch.display_path(),
        }),
        (_, Some(PatchValue::Gifts(next))) => {
            let previous = std::mem::replace(gifts, next.clone());
            Ok(Patch {
                op: PatchOp::Replace,
                path: patch.path.clone(),
                value: Some(PatchValue::Gifts(previous)),
            })
        }
        _ => Err(invalid(patch, "a map of gifts")),
    }
}

fn apply_to_gift(
    gifts: &mut BTreeMap<String, Gift>,
    id: &str,
    patch: &Patch,
) -> Result<Option<Patch>, PatchError> {
    match (patch.op, &patch.value) {
        (PatchOp::Remove, _) => Ok(gifts.remove(id).map(|previous| Patch {
            op: PatchOp::Add,
            path: patch.path.clone(),
            value: Some(PatchValue::Gift(previous)),
        })),
        (_, Some(PatchValue::Gift(gift))) => {
            let undo = match gifts.insert(id.to_string(), gift.clone()) {
                Some(previous) => Patch {
                    op: PatchOp::Replace,
                    path: patch.path.clone(),
                    value: Some(PatchValue::Gift(previous)),
                },
                None => Patch {
                    op: PatchOp::Remove,
                    path: patch.path.clone(),
                    value: None,
                },
            };
            Ok(Some(undo))
        }
        _ => Err(invalid(patch, "a gift record")),
    }
}

fn apply_to_field(gift: &mut Gift, field: &str, patch: &Patch) -> Result<Patch, PatchError> {
    let previous = match field {
        "reservedBy" => {
            let next = match (patch.op, &patch.value) {
                (PatchOp::Remove, _) | (_, Some(PatchValue::Null)) => None,
                (_, Some(PatchValue::Text(user_id))) => Some(user_id.clone()),
                _ => return Err(invalid(patch, "a user id or null")),
            };
            PatchValue::from(std::mem::replace(&mut gift.reserved_by, next))
        }
        "id" | "description" | "image" => {
            let slot = match field {
                "id" => &mut gift.id,
                "description" => &mut gift.description,
                _ => &mut gift.image,
            };
            match (patch.op, &patch.value) {
                (PatchOp::Remove, _) => {
                    return Err(PatchError::NotRemovable {
                        path: patch.display_path(),
                    })
                }
                (_, Some(PatchValue::Text(text))) => {
                    PatchValue::Text(std::mem::replace(slot, text.clone()))
                }
                _ => return Err(invalid(patch, "a string")),
            }
        }
        _ => return Err(unsupported(patch)),
    };

    Ok(Patch {
        op: PatchOp::Replace,
        path: patch.path.clone(),
        value: Some(previous),
    })
}

fn unsupported(patch: &Patch) -> PatchError {
    PatchError::UnsupportedPath {
        path: patch.display_path(),
    }
}

fn invalid(patch: &Patch, expected: &'static str) -> PatchError {
    PatchError::InvalidValue {
        op: patch.op,
        path: patch.display_path(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::User;

    fn doc() -> Document {
        Document::seed(User::new("0", "Alice")).unwrap()
    }

    fn mug() -> Gift {
        Gift::new("g1", "Mug", "x.png")
    }

    #[test]
    fn add_gift_then_reserve() {
        let patches = vec![
            Patch::add(["gifts", "g1"], mug()),
            Patch::replace(["gifts", "g1", "reservedBy"], PatchValue::Text("0".into())),
        ];
        let applied = apply_patches(&doc(), &patches).unwrap();
        assert_eq!(applied.document.gifts["g1"].reserved_by.as_deref(), Some("0"));
        assert_eq!(applied.inverse.len(), 2);
        // Inverse runs last-first
        assert_eq!(applied.inverse[1], Patch::remove(["gifts", "g1"]));
    }

    #[test]
    fn order_is_load_bearing() {
        let reserve = Patch::replace(["gifts", "g1", "reservedBy"], PatchValue::Text("0".into()));
        let add = Patch::add(["gifts", "g1"], mug());

        assert!(apply_patches(&doc(), &[add.clone(), reserve.clone()]).is_ok());
        assert_eq!(
            apply_patches(&doc(), &[reserve, add]).unwrap_err(),
            PatchError::Unresolved {
                path: "/gifts/g1/reservedBy".into()
            }
        );
    }

    #[test]
    fn failure_leaves_input_untouched() {
        let start = doc();
        let patches = vec![
            Patch::add(["gifts", "g1"], mug()),
            Patch::replace(["users", "0"], PatchValue::Text("x".into())),
        ];
        assert!(matches!(
            apply_patches(&start, &patches),
            Err(PatchError::ReadOnly { .. })
        ));
        assert!(!start.gifts.contains_key("g1"));
    }

    #[test]
    fn inverse_restores_document() {
        let start = doc();
        let patches = vec![
            Patch::add(["gifts", "g1"], mug()),
            Patch::replace(["gifts", "immer_book", "description"], PatchValue::Text("Renamed".into())),
            Patch::remove(["gifts", "egghead_subscription"]),
            Patch::remove(["gifts", "coffee_mug", "reservedBy"]),
        ];
        let forward = apply_patches(&start, &patches).unwrap();
        let back = apply_patches(&forward.document, &forward.inverse).unwrap();
        assert_eq!(back.document, start);
    }

    #[test]
    fn replace_whole_collection() {
        let start = doc();
        let mut next = BTreeMap::new();
        next.insert("g1".to_string(), mug());
        let patches = vec![Patch::replace(["gifts"], PatchValue::Gifts(next.clone()))];

        let applied = apply_patches(&start, &patches).unwrap();
        assert_eq!(applied.document.gifts, next);
        let back = apply_patches(&applied.document, &applied.inverse).unwrap();
        assert_eq!(back.document.gifts, start.gifts);
    }

    #[test]
    fn removing_absent_gift_is_a_no_op() {
        let start = doc();
        let applied = apply_patches(&start, &[Patch::remove(["gifts", "nope"])]).unwrap();
        assert_eq!(applied.document, start);
        assert!(applied.inverse.is_empty());
    }

    #[test]
    fn null_clears_reservation() {
        let applied = apply_patches(
            &doc(),
            &[Patch::replace(["gifts", "coffee_mug", "reservedBy"], PatchValue::Null)],
        )
        .unwrap();
        assert!(!applied.document.gifts["coffee_mug"].is_reserved());
        assert_eq!(
            applied.inverse[0].value,
            Some(PatchValue::Text("2".into()))
        );
    }

    #[test]
    fn rejects_wrong_value_types() {
        let err = apply_patches(
            &doc(),
            &[Patch::replace(["gifts", "immer_book", "image"], PatchValue::Null)],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::InvalidValue { expected: "a string", .. }));

        let err = apply_patches(
            &doc(),
            &[Patch::add(["gifts", "g1"], PatchValue::Text("mug".into()))],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_unreplicated_and_unknown_paths() {
        let err = apply_patches(
            &doc(),
            &[Patch::replace(["currentUser", "id"], PatchValue::Text("9".into()))],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::NotReplicated { .. }));

        let err = apply_patches(&doc(), &[Patch::remove(["settings"])]).unwrap_err();
        assert!(matches!(err, PatchError::UnsupportedPath { .. }));

        let err = apply_patches(
            &doc(),
            &[Patch::remove(vec![PathSegment::from("gifts"), PathSegment::Index(0)])],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::UnsupportedPath { .. }));
    }

    #[test]
    fn rejects_removing_required_targets() {
        let err = apply_patches(&doc(), &[Patch::remove(["gifts"])]).unwrap_err();
        assert!(matches!(err, PatchError::NotRemovable { .. }));

        let err =
            apply_patches(&doc(), &[Patch::remove(["gifts", "immer_book", "description"])])
                .unwrap_err();
        assert!(matches!(err, PatchError::NotRemovable { .. }));
    }

    #[test]
    fn rejects_malformed_patch() {
        let patch = Patch {
            op: PatchOp::Add,
            path: vec!["gifts".into(), "g1".into()],
            value: None,
        };
        assert!(matches!(
            apply_patches(&doc(), &[patch]),
            Err(PatchError::Malformed(_))
        ));
    }

    #[test]
    fn application_is_deterministic() {
        let start = doc();
        let patches = vec![
            Patch::add(["gifts", "g1"], mug()),
            Patch::replace(["gifts", "g1", "reservedBy"], PatchValue::Text("3".into())),
        ];
        let first = apply_patches(&start, &patches).unwrap();
        // Apply and revert elsewhere a few times; nothing global changes.
        for _ in 0..3 {
            let there = apply_patches(&start, &patches).unwrap();
            apply_patches(&there.document, &there.inverse).unwrap();
        }
        let again = apply_patches(&start, &patches).unwrap();
        assert_eq!(first, again);
    }
}
