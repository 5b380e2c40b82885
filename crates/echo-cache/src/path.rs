// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field paths, edge records, and path-addressed access into node data.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ident::NodeId;

/// One step of a [`FieldPath`]: an object key or an array index.
///
/// Serialized untagged, so a path reads as a plain JSON array such as
/// `["friends", 0, "address"]`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathPart {
    /// Array index.
    Index(usize),
    /// Object key.
    Key(String),
}

impl PathPart {
    /// Convenience constructor for an object key.
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }
}

impl fmt::Display for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

/// Location within a node's data, relative to the node itself.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathPart>);

impl FieldPath {
    /// The empty path (the node's data itself).
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns the path parts.
    #[must_use]
    pub fn parts(&self) -> &[PathPart] {
        &self.0
    }

    /// Returns `true` for the empty path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the path has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path extended by `key`.
    #[must_use]
    pub fn child_key(&self, key: &str) -> Self {
        let mut parts = self.0.clone();
        parts.push(PathPart::Key(key.to_owned()));
        Self(parts)
    }

    /// Returns a new path extended by `index`.
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        let mut parts = self.0.clone();
        parts.push(PathPart::Index(index));
        Self(parts)
    }

    /// Returns a new path made of `self` followed by `other`.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let mut parts = self.0.clone();
        parts.extend(other.0.iter().cloned());
        Self(parts)
    }

    /// Returns `true` if `prefix` is a (non-strict) prefix of `self`.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the prefix of `self` of length `len`.
    #[must_use]
    pub fn truncated(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }
}

impl From<Vec<PathPart>> for FieldPath {
    fn from(parts: Vec<PathPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

/// One end of a graph edge: the node on the other side and the path within
/// the referencing node's data where the reference lives.
///
/// For an outbound record, `id` is the target and `path` is where the owner
/// holds the reference. For an inbound record, `id` is the referencer and
/// `path` is where the referencer holds it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeReference {
    /// Node on the other side of the edge.
    pub id: NodeId,
    /// Path within the referencing node's data.
    pub path: FieldPath,
}

impl NodeReference {
    /// Builds a reference record.
    #[must_use]
    pub fn new(id: NodeId, path: FieldPath) -> Self {
        Self { id, path }
    }
}

/// Short name of a JSON value's shape, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Looks up the value at `path` inside `value`.
pub(crate) fn value_at<'a>(value: &'a Value, path: &[PathPart]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        current = match (part, current) {
            (PathPart::Key(k), Value::Object(map)) => map.get(k)?,
            (PathPart::Index(i), Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Returns a mutable slot at `path`, creating intermediate containers.
///
/// Intermediate values of the wrong shape are replaced: a key step turns a
/// non-object into `{}`, an index step turns a non-array into `[]` and pads
/// it with `null` up to the index.
pub(crate) fn slot_at<'a>(data: &'a mut Option<Value>, path: &[PathPart]) -> &'a mut Value {
    let mut current = data.get_or_insert(Value::Null);
    for part in path {
        current = match part {
            PathPart::Key(k) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                &mut current[k.as_str()]
            }
            PathPart::Index(i) => {
                match &mut *current {
                    Value::Array(items) if items.len() > *i => {}
                    Value::Array(items) => items.resize(*i + 1, Value::Null),
                    other => *other = Value::Array(vec![Value::Null; *i + 1]),
                }
                &mut current[*i]
            }
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_serialize_as_plain_arrays() {
        let path = FieldPath::root().child_key("friends").child_index(2);
        assert_eq!(serde_json::to_value(&path).ok(), Some(json!(["friends", 2])));
        let back: FieldPath = serde_json::from_value(json!(["friends", 2])).unwrap_or_default();
        assert_eq!(back, path);
        assert_eq!(path.to_string(), "friends.2");
        assert_eq!(FieldPath::root().to_string(), "<root>");
    }

    #[test]
    fn slot_at_creates_and_pads_containers() {
        let mut data = None;
        *slot_at(&mut data, &[PathPart::key("a"), PathPart::Index(2)]) = json!(7);
        assert_eq!(data, Some(json!({"a": [null, null, 7]})));
        *slot_at(&mut data, &[PathPart::key("a"), PathPart::key("b")]) = json!(false);
        assert_eq!(data, Some(json!({"a": {"b": false}})));
    }

    #[test]
    fn value_at_follows_keys_and_indices() {
        let data = json!({"a": {"b": [0, {"c": ""}]}});
        let path = [
            PathPart::key("a"),
            PathPart::key("b"),
            PathPart::Index(1),
            PathPart::key("c"),
        ];
        assert_eq!(value_at(&data, &path), Some(&json!("")));
        assert_eq!(value_at(&data, &[PathPart::key("a"), PathPart::Index(0)]), None);
    }

    #[test]
    fn prefix_checks() {
        let a = FieldPath::root().child_key("x").child_index(0);
        assert!(a.starts_with(&FieldPath::root().child_key("x")));
        assert!(a.starts_with(&a));
        assert!(!FieldPath::root().child_key("x").starts_with(&a));
        assert_eq!(a.truncated(1), FieldPath::root().child_key("x"));
    }
}
