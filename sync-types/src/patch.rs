//! Structural patches and patch batches.
//!
//! A patch names its target by a path relative to the document root at the
//! time it is applied. Paths are not pre-resolved, so the order of patches
//! inside a batch (and of batches inside a log) is significant.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Gift, TypesError};

/// Patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a value at the path
    Add,
    /// Overwrite the value at the path
    Replace,
    /// Delete the value at the path
    Remove,
}

impl PatchOp {
    /// Whether patches with this op must carry a `value`.
    pub fn requires_value(self) -> bool {
        matches!(self, Self::Add | Self::Replace)
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Replace => f.write_str("replace"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// One step of a patch path: an object key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Sequence index
    Index(u64),
    /// Mapping key
    Key(String),
}

impl PathSegment {
    /// The key, if this segment is one.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::Index(_) => None,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<u64> for PathSegment {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

/// Values a patch can carry.
///
/// The set is closed over what the gift list document actually stores.
/// `Null` is a present value (it clears a reservation) and is distinct from
/// a patch with no `value` at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatchValue {
    /// JSON `null`
    Null,
    /// A scalar string (description, image, user id)
    Text(String),
    /// A whole gift record
    Gift(Gift),
    /// The whole gifts collection
    Gifts(BTreeMap<String, Gift>),
}

impl From<Gift> for PatchValue {
    fn from(gift: Gift) -> Self {
        Self::Gift(gift)
    }
}

impl From<Option<String>> for PatchValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

/// A single structural change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// What to do
    pub op: PatchOp,
    /// Where to do it, from the document root
    pub path: Vec<PathSegment>,
    /// The new value; present iff `op` is add or replace
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub value: Option<PatchValue>,
}

/// A `value` key that is present (even as `null`) is `Some`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<PatchValue>, D::Error>
where
    D: Deserializer<'de>,
{
    PatchValue::deserialize(deserializer).map(Some)
}

impl Patch {
    /// Build an `add` patch.
    pub fn add<P: Into<PathSegment>>(
        path: impl IntoIterator<Item = P>,
        value: impl Into<PatchValue>,
    ) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into_iter().map(Into::into).collect(),
            value: Some(value.into()),
        }
    }

    /// Build a `replace` patch.
    pub fn replace<P: Into<PathSegment>>(
        path: impl IntoIterator<Item = P>,
        value: impl Into<PatchValue>,
    ) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into_iter().map(Into::into).collect(),
            value: Some(value.into()),
        }
    }

    /// Build a `remove` patch.
    pub fn remove<P: Into<PathSegment>>(path: impl IntoIterator<Item = P>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into_iter().map(Into::into).collect(),
            value: None,
        }
    }

    /// Check that the patch carries exactly the fields its op requires.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.path.is_empty() {
            return Err(TypesError::malformed(format!(
                "{} patch has an empty path",
                self.op
            )));
        }
        match (self.op.requires_value(), self.value.is_some()) {
            (true, false) => Err(TypesError::malformed(format!(
                "{} patch at {} is missing its value",
                self.op,
                self.display_path()
            ))),
            (false, true) => Err(TypesError::malformed(format!(
                "{} patch at {} must not carry a value",
                self.op,
                self.display_path()
            ))),
            _ => Ok(()),
        }
    }

    /// Render the path as `/a/b/c` for logs and errors.
    pub fn display_path(&self) -> String {
        self.path.iter().fold(String::new(), |mut acc, seg| {
            acc.push('/');
            acc.push_str(&seg.to_string());
            acc
        })
    }
}

/// An ordered sequence of patches representing one logical action.
///
/// Serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchBatch(Vec<Patch>);

impl PatchBatch {
    /// Wrap patches without validating them.
    pub fn new(patches: Vec<Patch>) -> Self {
        Self(patches)
    }

    /// Decode a wire frame and validate it.
    ///
    /// An empty array decodes but fails validation; callers that accept
    /// empty snapshots use [`PatchBatch::from_json_unchecked`].
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        let batch = Self::from_json_unchecked(text)?;
        batch.validate()?;
        Ok(batch)
    }

    /// Decode a wire frame, checking only that it is well-formed JSON patches.
    pub fn from_json_unchecked(text: &str) -> Result<Self, TypesError> {
        serde_json::from_str(text).map_err(TypesError::Deserialization)
    }

    /// Encode as a wire frame.
    pub fn to_json(&self) -> Result<String, TypesError> {
        serde_json::to_string(self).map_err(TypesError::Serialization)
    }

    /// Check the batch is non-empty and every patch is well-formed.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.0.is_empty() {
            return Err(TypesError::malformed("batch contains no patches"));
        }
        self.0.iter().try_for_each(Patch::validate)
    }

    /// Concatenate batches in order into one flat batch.
    pub fn flatten<'a>(batches: impl IntoIterator<Item = &'a PatchBatch>) -> Self {
        Self(
            batches
                .into_iter()
                .flat_map(|b| b.0.iter().cloned())
                .collect(),
        )
    }

    /// The patches, in order.
    pub fn patches(&self) -> &[Patch] {
        &self.0
    }

    /// Number of patches.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the batch holds no patches.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the patches.
    pub fn iter(&self) -> std::slice::Iter<'_, Patch> {
        self.0.iter()
    }

    /// Unwrap into the patch list.
    pub fn into_inner(self) -> Vec<Patch> {
        self.0
    }
}

impl From<Vec<Patch>> for PatchBatch {
    fn from(patches: Vec<Patch>) -> Self {
        Self(patches)
    }
}

impl FromIterator<Patch> for PatchBatch {
    fn from_iter<I: IntoIterator<Item = Patch>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PatchBatch {
    type Item = Patch;
    type IntoIter = std::vec::IntoIter<Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatchBatch {
    type Item = &'a Patch;
    type IntoIter = std::slice::Iter<'a, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_array() {
        let text = r#"[
            {"op":"add","path":["gifts","g1"],"value":{"id":"g1","description":"Mug","image":"x.png"}},
            {"op":"replace","path":["gifts","g1","reservedBy"],"value":"u1"},
            {"op":"remove","path":["gifts","g2"]}
        ]"#;
        let batch = PatchBatch::from_json(text).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.patches()[0].value, Some(PatchValue::Gift(Gift::new("g1", "Mug", "x.png"))));
        assert_eq!(batch.patches()[1].value, Some(PatchValue::Text("u1".into())));
        assert_eq!(batch.patches()[2].op, PatchOp::Remove);
        assert_eq!(batch.patches()[2].value, None);
    }

    #[test]
    fn null_value_is_present() {
        let batch =
            PatchBatch::from_json(r#"[{"op":"replace","path":["gifts","g1","reservedBy"],"value":null}]"#)
                .unwrap();
        assert_eq!(batch.patches()[0].value, Some(PatchValue::Null));
    }

    #[test]
    fn null_value_survives_encoding() {
        let patch = Patch::replace(["gifts", "g1", "reservedBy"], PatchValue::Null);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(
            json,
            r#"{"op":"replace","path":["gifts","g1","reservedBy"],"value":null}"#
        );
    }

    #[test]
    fn remove_omits_value_key() {
        let json = serde_json::to_string(&Patch::remove(["gifts", "g1"])).unwrap();
        assert_eq!(json, r#"{"op":"remove","path":["gifts","g1"]}"#);
    }

    #[test]
    fn gifts_map_value_decodes() {
        let batch = PatchBatch::from_json(
            r#"[{"op":"replace","path":["gifts"],"value":{"a":{"id":"a","description":"A","image":"a.png","reservedBy":null}}}]"#,
        )
        .unwrap();
        match &batch.patches()[0].value {
            Some(PatchValue::Gifts(map)) => assert_eq!(map["a"].description, "A"),
            other => panic!("expected gifts map, got {other:?}"),
        }
    }

    #[test]
    fn empty_map_value_is_empty_gifts() {
        let batch =
            PatchBatch::from_json(r#"[{"op":"replace","path":["gifts"],"value":{}}]"#).unwrap();
        assert_eq!(batch.patches()[0].value, Some(PatchValue::Gifts(BTreeMap::new())));
    }

    #[test]
    fn index_segments_decode_as_indices() {
        let batch =
            PatchBatch::from_json(r#"[{"op":"remove","path":["users",0]}]"#).unwrap();
        assert_eq!(batch.patches()[0].path[1], PathSegment::Index(0));
        assert_eq!(batch.patches()[0].display_path(), "/users/0");
    }

    #[test]
    fn empty_batch_is_malformed() {
        let err = PatchBatch::from_json("[]").unwrap_err();
        assert!(matches!(err, TypesError::MalformedBatch { .. }));
        assert!(PatchBatch::from_json_unchecked("[]").unwrap().is_empty());
    }

    #[test]
    fn add_without_value_is_malformed() {
        let err = PatchBatch::from_json(r#"[{"op":"add","path":["gifts","g1"]}]"#).unwrap_err();
        assert!(err.to_string().contains("missing its value"));
    }

    #[test]
    fn remove_with_value_is_malformed() {
        let err =
            PatchBatch::from_json(r#"[{"op":"remove","path":["gifts","g1"],"value":"x"}]"#).unwrap_err();
        assert!(err.to_string().contains("must not carry a value"));
    }

    #[test]
    fn empty_path_is_malformed() {
        let err = PatchBatch::from_json(r#"[{"op":"remove","path":[]}]"#).unwrap_err();
        assert!(err.to_string().contains("empty path"));
    }

    #[test]
    fn unknown_op_fails_to_decode() {
        let err = PatchBatch::from_json(r#"[{"op":"move","path":["gifts"]}]"#).unwrap_err();
        assert!(matches!(err, TypesError::Deserialization(_)));
    }

    #[test]
    fn non_array_fails_to_decode() {
        assert!(PatchBatch::from_json(r#"{"op":"add"}"#).is_err());
        assert!(PatchBatch::from_json("not json").is_err());
    }

    #[test]
    fn flatten_preserves_order() {
        let a = PatchBatch::new(vec![Patch::remove(["gifts", "a"])]);
        let b = PatchBatch::new(vec![
            Patch::remove(["gifts", "b"]),
            Patch::remove(["gifts", "c"]),
        ]);
        let flat = PatchBatch::flatten([&a, &b]);
        let paths: Vec<_> = flat.iter().map(Patch::display_path).collect();
        assert_eq!(paths, ["/gifts/a", "/gifts/b", "/gifts/c"]);
    }
}
