//! Record types carried inside patch values.

use serde::{Deserialize, Serialize};

/// A gift on the shared list.
///
/// `reserved_by` holds the id of the user who reserved it. An unreserved
/// gift serializes `reservedBy` as `null`; a missing field reads as unreserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    /// Gift identifier (also its key in the gifts map)
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Image URL
    pub image: String,
    /// User id of the reserving user, if any
    #[serde(default)]
    pub reserved_by: Option<String>,
}

impl Gift {
    /// Create an unreserved gift.
    pub fn new(id: impl Into<String>, description: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            image: image.into(),
            reserved_by: None,
        }
    }

    /// Check whether anyone holds a reservation.
    pub fn is_reserved(&self) -> bool {
        self.reserved_by.is_some()
    }
}

/// A participant. Users are read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: String,
    /// Display name
    pub name: String,
}

impl User {
    /// Create a user.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreserved_gift_serializes_null() {
        let gift = Gift::new("g1", "Mug", "x.png");
        let json = serde_json::to_string(&gift).unwrap();
        assert_eq!(
            json,
            r#"{"id":"g1","description":"Mug","image":"x.png","reservedBy":null}"#
        );
    }

    #[test]
    fn missing_reserved_by_reads_as_unreserved() {
        let gift: Gift =
            serde_json::from_str(r#"{"id":"g1","description":"Mug","image":"x.png"}"#).unwrap();
        assert!(!gift.is_reserved());
    }

    #[test]
    fn reserved_gift_uses_camel_case() {
        let mut gift = Gift::new("g1", "Mug", "x.png");
        gift.reserved_by = Some("u1".into());
        let json = serde_json::to_value(&gift).unwrap();
        assert_eq!(json["reservedBy"], "u1");
    }
}
