// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node identifiers and parameterized-id derivation.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::FieldPath;

/// Separator used when deriving parameterized value ids.
pub const PARAMETERIZED_ID_SEPARATOR: char = '❖';

/// Identifier of the query root node.
pub const QUERY_ROOT: &str = "ROOT_QUERY";

/// Identifier of the mutation root node.
pub const MUTATION_ROOT: &str = "ROOT_MUTATION";

/// Strongly typed identifier for a node in the cache graph.
///
/// Entity ids come from an [`crate::EntityIdResolver`], root ids are the
/// fixed sentinels [`QUERY_ROOT`] / [`MUTATION_ROOT`], and parameterized value
/// ids are derived with [`NodeId::parameterized`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps an arbitrary string as a node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The query root sentinel.
    #[must_use]
    pub fn query_root() -> Self {
        Self(QUERY_ROOT.to_owned())
    }

    /// The mutation root sentinel.
    #[must_use]
    pub fn mutation_root() -> Self {
        Self(MUTATION_ROOT.to_owned())
    }

    /// Returns `true` for the fixed root sentinels.
    ///
    /// Roots have no inbound edges and are never orphan-collected.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == QUERY_ROOT || self.0 == MUTATION_ROOT
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the id of the parameterized value stored for `path` under
    /// `container`, called with `args`.
    ///
    /// Stable definition:
    /// `container ❖ json(path) ❖ json(canonical(args))`, where `canonical`
    /// sorts object keys recursively. Equivalent argument maps therefore always
    /// collide to the same id regardless of the order they were written in.
    #[must_use]
    pub fn parameterized(container: &Self, path: &FieldPath, args: &Map<String, Value>) -> Self {
        let args = canonicalize(&Value::Object(args.clone()));
        // Serializing `Value`/`FieldPath` into a String cannot fail.
        let path_json = serde_json::to_string(path).unwrap_or_default();
        let args_json = serde_json::to_string(&args).unwrap_or_default();
        Self(format!(
            "{container}{PARAMETERIZED_ID_SEPARATOR}{path_json}{PARAMETERIZED_ID_SEPARATOR}{args_json}"
        ))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns a copy of `value` with every object's keys in ascending order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    out.insert(key.clone(), canonicalize(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
