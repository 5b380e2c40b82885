// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted cache format.
//!
//! A serialized cache is a map from node id to
//! `{variant, data, inbound, outbound}`; edges are written as
//! `{"id": ..., "path": [...]}` records. The same shape is used for JSON and
//! CBOR. Parsing ([`SerializedCache::from_value`]) checks each record in
//! isolation; graph-level checks (dangling or asymmetric edges, references
//! into holes) happen in [`crate::restore`].
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, RestoreError};
use crate::graph::GraphSnapshot;
use crate::ident::NodeId;
use crate::node::{NodeParts, NodeSnapshot, NodeVariant};
use crate::path::NodeReference;

/// One persisted node record.
///
/// `data` is omitted when the node stores nothing; an explicit `null` is a
/// stored null (for example a reference placeholder).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializedNode {
    /// Node variant.
    pub variant: NodeVariant,
    /// Stored data (`null` placeholders mark references).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Referencing nodes and where they hold the reference.
    pub inbound: Vec<NodeReference>,
    /// Referenced nodes and where this node holds the reference.
    pub outbound: Vec<NodeReference>,
}

impl SerializedNode {
    fn from_snapshot(node: &NodeSnapshot) -> Self {
        Self {
            variant: node.variant(),
            data: node.data().cloned(),
            inbound: node.inbound().to_vec(),
            outbound: node.outbound().to_vec(),
        }
    }

    pub(crate) fn to_snapshot(&self) -> NodeSnapshot {
        NodeSnapshot::from_parts(
            self.variant,
            NodeParts {
                data: self.data.clone(),
                inbound: self.inbound.clone(),
                outbound: self.outbound.clone(),
            },
        )
    }
}

/// A whole persisted graph, ordered by node id.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct SerializedCache(BTreeMap<NodeId, SerializedNode>);

impl SerializedCache {
    /// Serializes every node of `graph`.
    #[must_use]
    pub fn from_graph(graph: &GraphSnapshot) -> Self {
        Self(
            graph
                .iter()
                .map(|(id, node)| (id.clone(), SerializedNode::from_snapshot(node)))
                .collect(),
        )
    }

    /// Node records, ascending by id.
    #[must_use]
    pub fn nodes(&self) -> &BTreeMap<NodeId, SerializedNode> {
        &self.0
    }

    /// Record stored under `id`.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&SerializedNode> {
        self.0.get(id)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON form of the cache.
    #[must_use]
    pub fn to_value(&self) -> Value {
        // Keys are strings and records are plain data; conversion cannot fail.
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Parses the JSON form, validating each record's shape.
    ///
    /// # Errors
    /// [`RestoreError::NotAMap`] for a non-object, otherwise the first
    /// record's [`RestoreError::MalformedNode`] or
    /// [`RestoreError::UnknownVariant`].
    pub fn from_value(value: &Value) -> Result<Self, RestoreError> {
        let Value::Object(map) = value else {
            return Err(RestoreError::NotAMap);
        };
        map.iter()
            .map(|(id, record)| {
                let id = NodeId::new(id.as_str());
                parse_node(&id, record).map(|node| (id, node))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }

    /// Canonical CBOR encoding (records ascending by id).
    ///
    /// # Errors
    /// [`CacheError::Codec`] if a record cannot be encoded.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CacheError> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out).map_err(|e| CacheError::Codec(e.to_string()))?;
        Ok(out)
    }

    /// Decodes [`SerializedCache::to_cbor`] output.
    ///
    /// # Errors
    /// [`CacheError::Codec`] for undecodable bytes, [`CacheError::Restore`]
    /// for a malformed record.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CacheError> {
        let value: Value =
            ciborium::from_reader(bytes).map_err(|e| CacheError::Codec(e.to_string()))?;
        Ok(Self::from_value(&value)?)
    }
}

fn parse_node(id: &NodeId, record: &Value) -> Result<SerializedNode, RestoreError> {
    let malformed = |reason: &str| RestoreError::MalformedNode {
        id: id.clone(),
        reason: reason.to_owned(),
    };
    let Value::Object(fields) = record else {
        return Err(malformed("record is not an object"));
    };
    let variant_name = fields
        .get("variant")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("`variant` must be a string"))?;
    let variant = NodeVariant::parse(variant_name).ok_or_else(|| RestoreError::UnknownVariant {
        id: id.clone(),
        variant: variant_name.to_owned(),
    })?;
    Ok(SerializedNode {
        variant,
        data: fields.get("data").cloned(),
        inbound: parse_edges(fields.get("inbound"))
            .map_err(|reason| malformed(&format!("`inbound` {reason}")))?,
        outbound: parse_edges(fields.get("outbound"))
            .map_err(|reason| malformed(&format!("`outbound` {reason}")))?,
    })
}

fn parse_edges(value: Option<&Value>) -> Result<Vec<NodeReference>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v @ Value::Array(_)) => serde_json::from_value(v.clone()).map_err(|e| e.to_string()),
        Some(_) => Err("must be an array of {id, path} records".to_owned()),
    }
}
