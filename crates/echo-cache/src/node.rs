// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node snapshot types: one addressable unit of the cache graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ident::NodeId;
use crate::path::{FieldPath, NodeReference};

/// Discriminant of a [`NodeSnapshot`], as written in the persisted format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeVariant {
    /// Node identified by an extracted entity id (or a root sentinel).
    Entity,
    /// Node identified by `(container, path, arguments)`.
    ParameterizedValue,
}

impl NodeVariant {
    /// Name used in the persisted format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "Entity",
            Self::ParameterizedValue => "ParameterizedValue",
        }
    }

    /// Parses the persisted name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Entity" => Some(Self::Entity),
            "ParameterizedValue" => Some(Self::ParameterizedValue),
            _ => None,
        }
    }
}

/// Data and edges shared by both node variants.
///
/// Invariants
/// - `data` never embeds another node's data. A reference held at path `p`
///   is a `null` placeholder in `data` plus an `outbound` record at `p`.
/// - `inbound` and `outbound` are sets: no record appears twice.
/// - Edges are symmetric across a [`crate::GraphSnapshot`]: `A.outbound`
///   contains `{B, p}` iff `B.inbound` contains `{A, p}`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct NodeParts {
    pub(crate) data: Option<Value>,
    pub(crate) inbound: Vec<NodeReference>,
    pub(crate) outbound: Vec<NodeReference>,
}

impl NodeParts {
    /// Parts holding `data` and no edges.
    #[must_use]
    pub fn with_data(data: Option<Value>) -> Self {
        Self {
            data,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }
}

/// Immutable record of one node in a [`crate::GraphSnapshot`].
#[derive(Clone, Debug, PartialEq)]
pub enum NodeSnapshot {
    /// An entity (or root) node.
    Entity(NodeParts),
    /// A parameterized field value sitting between a container and its value.
    ParameterizedValue(NodeParts),
}

impl NodeSnapshot {
    /// Builds a node of `variant` from `parts`.
    #[must_use]
    pub fn from_parts(variant: NodeVariant, parts: NodeParts) -> Self {
        match variant {
            NodeVariant::Entity => Self::Entity(parts),
            NodeVariant::ParameterizedValue => Self::ParameterizedValue(parts),
        }
    }

    /// Returns the node's variant.
    #[must_use]
    pub fn variant(&self) -> NodeVariant {
        match self {
            Self::Entity(_) => NodeVariant::Entity,
            Self::ParameterizedValue(_) => NodeVariant::ParameterizedValue,
        }
    }

    /// Returns the shared parts.
    #[must_use]
    pub fn parts(&self) -> &NodeParts {
        match self {
            Self::Entity(p) | Self::ParameterizedValue(p) => p,
        }
    }

    pub(crate) fn parts_mut(&mut self) -> &mut NodeParts {
        match self {
            Self::Entity(p) | Self::ParameterizedValue(p) => p,
        }
    }

    /// The value stored at this node (`None` for a pure reference holder).
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.parts().data.as_ref()
    }

    /// Who references this node, and where.
    #[must_use]
    pub fn inbound(&self) -> &[NodeReference] {
        &self.parts().inbound
    }

    /// Which nodes this node references, and where.
    #[must_use]
    pub fn outbound(&self) -> &[NodeReference] {
        &self.parts().outbound
    }

    /// Target of the outbound edge held at exactly `path`, if any.
    #[must_use]
    pub fn outbound_at(&self, path: &FieldPath) -> Option<&NodeId> {
        self.parts()
            .outbound
            .iter()
            .find(|r| &r.path == path)
            .map(|r| &r.id)
    }

    /// Value of `field` in the node's data when it is a string.
    ///
    /// Used to find an entity's type name for migrations and update hooks.
    #[must_use]
    pub fn string_field(&self, field: &str) -> Option<&str> {
        self.data()
            .and_then(|d| d.get(field))
            .and_then(Value::as_str)
    }

    pub(crate) fn add_outbound(&mut self, reference: NodeReference) -> bool {
        insert_unique(&mut self.parts_mut().outbound, reference)
    }

    pub(crate) fn add_inbound(&mut self, reference: NodeReference) -> bool {
        insert_unique(&mut self.parts_mut().inbound, reference)
    }

    pub(crate) fn remove_inbound(&mut self, reference: &NodeReference) -> bool {
        let inbound = &mut self.parts_mut().inbound;
        let before = inbound.len();
        inbound.retain(|r| r != reference);
        inbound.len() != before
    }

    pub(crate) fn remove_outbound(&mut self, reference: &NodeReference) -> bool {
        let outbound = &mut self.parts_mut().outbound;
        let before = outbound.len();
        outbound.retain(|r| r != reference);
        outbound.len() != before
    }
}

fn insert_unique(set: &mut Vec<NodeReference>, reference: NodeReference) -> bool {
    if set.contains(&reference) {
        false
    } else {
        set.push(reference);
        true
    }
}
