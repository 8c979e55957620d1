//! The shared gift list document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sync_types::{Gift, User};
use thiserror::Error;

const GIFTS_FIXTURE: &str = include_str!("../fixtures/gifts.json");
const USERS_FIXTURE: &str = include_str!("../fixtures/users.json");

/// Bundled fixture data could not be decoded.
#[derive(Debug, Error)]
#[error("invalid {name} fixture: {source}")]
pub struct FixtureError {
    name: &'static str,
    #[source]
    source: serde_json::Error,
}

/// Shared state: the gifts, the users, and the local viewer.
///
/// `gifts` is the only replicated part. `users` is read-only reference
/// data and `current_user` is substituted by each client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Gifts keyed by gift id
    pub gifts: BTreeMap<String, Gift>,
    /// Known users, in fixture order
    pub users: Vec<User>,
    /// The local viewer; never replicated
    pub current_user: User,
}

impl Document {
    /// Create a document from parts.
    pub fn new(gifts: BTreeMap<String, Gift>, users: Vec<User>, current_user: User) -> Self {
        Self {
            gifts,
            users,
            current_user,
        }
    }

    /// The fixed base document every replica and the relay start from.
    pub fn seed(current_user: User) -> Result<Self, FixtureError> {
        Ok(Self::new(initial_gifts()?, initial_users()?, current_user))
    }

    /// Look up a gift.
    pub fn gift(&self, id: &str) -> Option<&Gift> {
        self.gifts.get(id)
    }

    /// Look up a user by id.
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Display name of whoever reserved `gift_id`, if reserved.
    pub fn reserver_name(&self, gift_id: &str) -> Option<&str> {
        let reserved_by = self.gift(gift_id)?.reserved_by.as_deref()?;
        self.user(reserved_by).map(|u| u.name.as_str())
    }
}

/// Gifts the list starts with (and returns to on reset).
pub fn initial_gifts() -> Result<BTreeMap<String, Gift>, FixtureError> {
    serde_json::from_str(GIFTS_FIXTURE).map_err(|source| FixtureError {
        name: "gifts",
        source,
    })
}

/// The read-only user list.
pub fn initial_users() -> Result<Vec<User>, FixtureError> {
    serde_json::from_str(USERS_FIXTURE).map_err(|source| FixtureError {
        name: "users",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_decode() {
        let gifts = initial_gifts().unwrap();
        assert!(!gifts.is_empty());
        for (id, gift) in &gifts {
            assert_eq!(id, &gift.id, "fixture keys match gift ids");
        }
        assert_eq!(initial_users().unwrap().len(), 5);
    }

    #[test]
    fn seed_uses_given_viewer() {
        let doc = Document::seed(User::new("1", "Bob")).unwrap();
        assert_eq!(doc.current_user.id, "1");
        assert_eq!(doc.user("0").map(|u| u.name.as_str()), Some("Alice"));
    }

    #[test]
    fn reserver_name_resolves_through_users() {
        let doc = Document::seed(User::new("0", "Alice")).unwrap();
        assert_eq!(doc.reserver_name("coffee_mug"), Some("Carol"));
        assert_eq!(doc.reserver_name("immer_book"), None);
        assert_eq!(doc.reserver_name("missing"), None);
    }

    #[test]
    fn serializes_with_camel_case_viewer() {
        let doc = Document::seed(User::new("0", "Alice")).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["currentUser"]["id"], "0");
    }
}
