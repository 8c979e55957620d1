//! Structural diff between two documents.

use sync_types::{Gift, Patch, PatchValue};

use crate::Document;

/// Patches that take `from` to `to`.
///
/// Only the replicated part (`gifts`) is compared. Gifts are visited in key
/// order: vanished gifts are removed, new gifts are added whole, and a gift
/// present in both gets one `replace` per field that changed.
pub fn diff(from: &Document, to: &Document) -> Vec<Patch> {
    let mut patches = Vec::new();

    for id in from.gifts.keys() {
        if !to.gifts.contains_key(id) {
            patches.push(Patch::remove(["gifts", id.as_str()]));
        }
    }

    for (id, next) in &to.gifts {
        match from.gifts.get(id) {
            None => patches.push(Patch::add(["gifts", id.as_str()], next.clone())),
            Some(prev) => diff_gift(id, prev, next, &mut patches),
        }
    }

    patches
}

fn diff_gift(id: &str, prev: &Gift, next: &Gift, out: &mut Vec<Patch>) {
    let text = |s: &String| PatchValue::Text(s.clone());
    let fields = [
        ("id", text(&prev.id), text(&next.id)),
        ("description", text(&prev.description), text(&next.description)),
        ("image", text(&prev.image), text(&next.image)),
        (
            "reservedBy",
            PatchValue::from(prev.reserved_by.clone()),
            PatchValue::from(next.reserved_by.clone()),
        ),
    ];

    for (field, before, after) in fields {
        if before != after {
            out.push(Patch::replace(["gifts", id, field], after));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply_patches;
    use sync_types::User;

    fn doc() -> Document {
        Document::seed(User::new("0", "Alice")).unwrap()
    }

    #[test]
    fn identical_documents_have_empty_diff() {
        assert!(diff(&doc(), &doc()).is_empty());
    }

    #[test]
    fn current_user_is_ignored() {
        let mut other = doc();
        other.current_user = User::new("3", "Dave");
        assert!(diff(&doc(), &other).is_empty());
    }

    #[test]
    fn emits_field_level_replaces() {
        let from = doc();
        let mut to = from.clone();
        if let Some(gift) = to.gifts.get_mut("immer_book") {
            gift.reserved_by = Some("4".into());
        }

        let patches = diff(&from, &to);
        assert_eq!(
            patches,
            vec![Patch::replace(
                ["gifts", "immer_book", "reservedBy"],
                PatchValue::Text("4".into())
            )]
        );
    }

    #[test]
    fn cleared_reservation_is_null() {
        let from = doc();
        let mut to = from.clone();
        if let Some(gift) = to.gifts.get_mut("coffee_mug") {
            gift.reserved_by = None;
        }
        let patches = diff(&from, &to);
        assert_eq!(patches[0].value, Some(PatchValue::Null));
    }

    #[test]
    fn diff_applies_to_target() {
        let from = doc();
        let mut to = from.clone();
        to.gifts.remove("egghead_subscription");
        to.gifts
            .insert("g1".into(), Gift::new("g1", "Mug", "x.png"));
        if let Some(gift) = to.gifts.get_mut("immer_book") {
            gift.description = "Second edition".into();
            gift.image = "new.png".into();
        }

        let patches = diff(&from, &to);
        assert_eq!(patches.len(), 4);
        let applied = apply_patches(&from, &patches).unwrap();
        assert_eq!(applied.document, to);
    }
}
