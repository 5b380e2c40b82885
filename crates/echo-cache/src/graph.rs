// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Immutable graph snapshots: one version of the cache's node arena.
//!
//! A [`GraphSnapshot`] maps node ids to shared [`NodeSnapshot`] records. Nodes
//! are held behind `Rc`, so a snapshot derived from another one shares every
//! node it did not edit (pointer-equal, see [`GraphSnapshot::node_rc`]).
//!
//! Each snapshot also memoizes read results per selection key. The memo is
//! append-only interior state; it never changes what the snapshot contains.
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::CacheError;
use crate::ident::NodeId;
use crate::node::{NodeSnapshot, NodeVariant};
use crate::operations::read::ReadResult;
use crate::path::FieldPath;
use crate::serialized::SerializedCache;

/// 256-bit digest of a snapshot's canonical encoding.
pub type Hash = [u8; 32];

type ReadMemo = FxHashMap<String, Rc<ReadResult>>;

/// Immutable mapping from node id to node snapshot.
#[derive(Debug, Default)]
pub struct GraphSnapshot {
    nodes: BTreeMap<NodeId, Rc<NodeSnapshot>>,
    read_memo: RefCell<ReadMemo>,
}

impl GraphSnapshot {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_nodes(nodes: BTreeMap<NodeId, Rc<NodeSnapshot>>) -> Self {
        Self {
            nodes,
            read_memo: RefCell::new(ReadMemo::default()),
        }
    }

    pub(crate) fn with_read_memo(
        nodes: BTreeMap<NodeId, Rc<NodeSnapshot>>,
        read_memo: ReadMemo,
    ) -> Self {
        Self {
            nodes,
            read_memo: RefCell::new(read_memo),
        }
    }

    /// Returns the node stored under `id`.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&NodeSnapshot> {
        self.nodes.get(id).map(AsRef::as_ref)
    }

    /// Returns the shared handle of the node stored under `id`.
    ///
    /// Nodes untouched by an edit are the same allocation in the parent and
    /// the derived snapshot (`Rc::ptr_eq` holds).
    #[must_use]
    pub fn node_rc(&self, id: &NodeId) -> Option<&Rc<NodeSnapshot>> {
        self.nodes.get(id)
    }

    /// Returns the data stored under `id`.
    ///
    /// A field that holds another entity reads as a `null` placeholder; use
    /// [`GraphSnapshot::entity_references`] or
    /// [`GraphSnapshot::entity_reference_at`] to resolve it.
    #[must_use]
    pub fn node_data(&self, id: &NodeId) -> Option<&Value> {
        self.get(id).and_then(NodeSnapshot::data)
    }

    /// Returns `true` if `id` is present.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All node ids, ascending.
    pub fn all_node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Iterates `(id, node)` pairs, ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeSnapshot)> {
        self.nodes.iter().map(|(id, n)| (id, n.as_ref()))
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the graph holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Target of the entity reference `container` holds at `path`.
    ///
    /// Edges into parameterized values are skipped: a plain field and an
    /// argument variant of the same field may share a path.
    #[must_use]
    pub fn entity_reference_at(&self, container: &NodeId, path: &FieldPath) -> Option<&NodeId> {
        self.get(container)?
            .outbound()
            .iter()
            .find(|r| {
                &r.path == path
                    && self
                        .get(&r.id)
                        .is_none_or(|n| n.variant() == NodeVariant::Entity)
            })
            .map(|r| &r.id)
    }

    /// Entity references held by `container`, as `(path, target)` pairs in
    /// edge order.
    ///
    /// Every pair names a `null` placeholder in the container's data and the
    /// entity stored in its place. Edges into parameterized values are left
    /// out.
    pub fn entity_references(
        &self,
        container: &NodeId,
    ) -> impl Iterator<Item = (&FieldPath, &NodeId)> + '_ {
        self.get(container)
            .map(NodeSnapshot::outbound)
            .unwrap_or_default()
            .iter()
            .filter(move |r| {
                self.get(&r.id)
                    .is_none_or(|n| n.variant() == NodeVariant::Entity)
            })
            .map(|r| (&r.path, &r.id))
    }

    /// Ids whose node differs between `self` and `other`, including ids
    /// present in only one of them.
    ///
    /// Shared allocations short-circuit the comparison.
    #[must_use]
    pub fn changed_node_ids(&self, other: &Self) -> BTreeSet<NodeId> {
        let mut changed = BTreeSet::new();
        for (id, node) in &self.nodes {
            match other.nodes.get(id) {
                Some(o) if Rc::ptr_eq(node, o) || node == o => {}
                _ => {
                    changed.insert(id.clone());
                }
            }
        }
        for id in other.nodes.keys() {
            if !self.nodes.contains_key(id) {
                changed.insert(id.clone());
            }
        }
        changed
    }

    /// BLAKE3 digest of the canonical CBOR encoding of every node.
    ///
    /// Equal graphs (same data and edges) have equal digests regardless of
    /// allocation identity, so the digest survives extract/restore.
    ///
    /// # Errors
    /// [`CacheError::Codec`] if the nodes cannot be encoded.
    pub fn digest(&self) -> Result<Hash, CacheError> {
        let bytes = SerializedCache::from_graph(self).to_cbor()?;
        Ok(blake3::hash(&bytes).into())
    }

    /// Lowercase hex of the first 8 bytes of [`GraphSnapshot::digest`].
    ///
    /// # Errors
    /// As [`GraphSnapshot::digest`].
    pub fn short_digest(&self) -> Result<String, CacheError> {
        let digest = self.digest()?;
        Ok(hex::encode(&digest[..8]))
    }

    /// Number of memoized read results.
    #[must_use]
    pub fn memoized_reads(&self) -> usize {
        self.read_memo.borrow().len()
    }

    pub(crate) fn nodes(&self) -> &BTreeMap<NodeId, Rc<NodeSnapshot>> {
        &self.nodes
    }

    pub(crate) fn memoized(&self, key: &str) -> Option<Rc<ReadResult>> {
        self.read_memo.borrow().get(key).cloned()
    }

    pub(crate) fn memoize(&self, key: &str, result: Rc<ReadResult>, limit: usize) {
        let mut memo = self.read_memo.borrow_mut();
        if memo.len() < limit || memo.contains_key(key) {
            memo.insert(key.to_owned(), result);
        }
    }

    /// Memo entries still valid after `edited` nodes changed.
    pub(crate) fn carried_read_memo(&self, edited: &BTreeSet<NodeId>) -> ReadMemo {
        self.read_memo
            .borrow()
            .iter()
            .filter(|(_, r)| r.touched_node_ids.is_disjoint(edited))
            .map(|(k, r)| (k.clone(), Rc::clone(r)))
            .collect()
    }
}

impl PartialEq for GraphSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}
