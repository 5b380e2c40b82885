// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rebuilds a cache snapshot from its persisted form.
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::error::{CacheError, RestoreError};
use crate::graph::GraphSnapshot;
use crate::ident::NodeId;
use crate::node::NodeVariant;
use crate::path::{value_at, NodeReference};
use crate::serialized::{SerializedCache, SerializedNode};
use crate::snapshot::CacheSnapshot;

/// A restored snapshot and the ids it contains.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// Snapshot with the restored graph as baseline and no optimistic
    /// changes.
    pub snapshot: CacheSnapshot,
    /// Every restored node id.
    pub edited_node_ids: BTreeSet<NodeId>,
}

/// Validates `serialized` as a graph and wraps it in a fresh snapshot.
///
/// # Errors
/// [`CacheError::Restore`] carrying:
/// - [`RestoreError::DanglingEdge`] for an edge to an absent node,
/// - [`RestoreError::AsymmetricEdge`] for an edge without its mirror,
/// - [`RestoreError::UnresolvableReference`] for an entity reference whose
///   path is a hole in its container's data.
pub fn restore(serialized: &SerializedCache) -> Result<RestoreOutcome, CacheError> {
    for (id, node) in serialized.nodes() {
        check_node(serialized, id, node)?;
    }
    let nodes: BTreeMap<_, _> = serialized
        .nodes()
        .iter()
        .map(|(id, node)| (id.clone(), Rc::new(node.to_snapshot())))
        .collect();
    let edited_node_ids = nodes.keys().cloned().collect();
    Ok(RestoreOutcome {
        snapshot: CacheSnapshot::new(Rc::new(GraphSnapshot::from_nodes(nodes))),
        edited_node_ids,
    })
}

fn check_node(
    serialized: &SerializedCache,
    id: &NodeId,
    node: &SerializedNode,
) -> Result<(), RestoreError> {
    for edge in &node.outbound {
        let target = serialized
            .get(&edge.id)
            .ok_or_else(|| RestoreError::DanglingEdge {
                id: id.clone(),
                target: edge.id.clone(),
            })?;
        if !target
            .inbound
            .contains(&NodeReference::new(id.clone(), edge.path.clone()))
        {
            return Err(RestoreError::AsymmetricEdge {
                from: id.clone(),
                to: edge.id.clone(),
                path: edge.path.clone(),
            });
        }
        // Argument variants live beside the container's data, not in it.
        let resolvable = target.variant == NodeVariant::ParameterizedValue
            || edge.path.is_root()
            || node
                .data
                .as_ref()
                .and_then(|d| value_at(d, edge.path.parts()))
                .is_some();
        if !resolvable {
            return Err(RestoreError::UnresolvableReference {
                id: id.clone(),
                target: edge.id.clone(),
                path: edge.path.clone(),
            });
        }
    }
    for edge in &node.inbound {
        let source = serialized
            .get(&edge.id)
            .ok_or_else(|| RestoreError::DanglingEdge {
                id: id.clone(),
                target: edge.id.clone(),
            })?;
        if !source
            .outbound
            .contains(&NodeReference::new(id.clone(), edge.path.clone()))
        {
            return Err(RestoreError::AsymmetricEdge {
                from: edge.id.clone(),
                to: id.clone(),
                path: edge.path.clone(),
            });
        }
    }
    Ok(())
}
