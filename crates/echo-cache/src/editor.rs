// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Snapshot editor: normalizes payloads into a new graph snapshot.
//!
//! An editor holds a parent [`GraphSnapshot`] and a working copy of every node
//! it has touched. [`SnapshotEditor::merge`] walks a selection together with a
//! payload and updates the working copies; [`SnapshotEditor::commit`] collects
//! orphans and publishes a new snapshot that shares every untouched (or
//! touched but unchanged) node with the parent.
//!
//! Each node has exactly one working copy per editor, and references are
//! recorded as ids, so repeated and cyclic references in a payload resolve to
//! the same copy without any recursion through already-visited entities.
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::context::CacheContext;
use crate::error::CacheError;
use crate::graph::GraphSnapshot;
use crate::ident::NodeId;
use crate::node::{NodeParts, NodeSnapshot, NodeVariant};
use crate::path::{slot_at, value_at, value_kind, FieldPath, NodeReference, PathPart};
use crate::selection::{Selection, SelectionSet};

/// Stand-in for a selected field the payload omits.
static ABSENT: Value = Value::Null;

/// Result of [`SnapshotEditor::commit`].
#[derive(Debug, Clone)]
pub struct EditorCommit {
    /// The new snapshot. Same `Rc` as the parent when nothing changed.
    pub snapshot: Rc<GraphSnapshot>,
    /// Nodes that were added, changed, or removed.
    pub edited_node_ids: BTreeSet<NodeId>,
    /// Selections merged through the editor, in order.
    pub written_selections: Vec<Selection>,
}

/// Copy-on-write builder for one derived [`GraphSnapshot`].
pub struct SnapshotEditor<'a> {
    context: &'a CacheContext,
    parent: &'a Rc<GraphSnapshot>,
    working: BTreeMap<NodeId, NodeSnapshot>,
    orphan_candidates: Vec<NodeId>,
    written: Vec<Selection>,
}

/// Everything a field walk needs besides the position it is at.
#[derive(Clone, Copy)]
struct Walk<'s> {
    variables: &'s Map<String, Value>,
    expects_identity: bool,
}

impl<'a> SnapshotEditor<'a> {
    /// Starts an editor deriving from `parent`.
    pub fn new(context: &'a CacheContext, parent: &'a Rc<GraphSnapshot>) -> Self {
        Self {
            context,
            parent,
            working: BTreeMap::new(),
            orphan_candidates: Vec::new(),
            written: Vec::new(),
        }
    }

    /// Merges `payload` into the working graph along `selection`.
    ///
    /// # Errors
    /// - [`CacheError::Shape`] if the payload's structure contradicts the
    ///   selection (a scalar where an object or array is required).
    /// - [`CacheError::Identity`] if an object carries an unusable id, or
    ///   carries none under a field that expects one.
    /// - [`CacheError::MissingField`] in strict mode, if a selected field is
    ///   absent from the payload.
    ///
    /// On error the working graph may be partially updated; callers drop the
    /// editor instead of committing it.
    pub fn merge(&mut self, selection: &Selection, payload: &Value) -> Result<(), CacheError> {
        let Value::Object(object) = payload else {
            return Err(CacheError::Shape {
                path: FieldPath::root().to_string(),
                expected: "object",
                found: value_kind(payload),
            });
        };
        let root = selection.root_id();
        self.ensure_entity(root);
        let walk = Walk {
            variables: selection.variables(),
            expects_identity: false,
        };
        self.merge_fields(
            root,
            &FieldPath::root(),
            object,
            selection.fields(),
            walk,
            &FieldPath::root(),
        )?;
        self.written.push(selection.clone());
        Ok(())
    }

    /// Collects orphans and publishes the new snapshot.
    pub fn commit(mut self) -> EditorCommit {
        let deleted = self.collect_orphans();
        let Self {
            parent,
            working,
            written,
            ..
        } = self;

        let mut nodes = parent.nodes().clone();
        let mut edited = BTreeSet::new();
        for id in &deleted {
            if nodes.remove(id).is_some() {
                edited.insert(id.clone());
            }
        }
        for (id, node) in working {
            if deleted.contains(&id) {
                continue;
            }
            match nodes.get(&id) {
                Some(existing) if **existing == node => {}
                _ => {
                    nodes.insert(id.clone(), Rc::new(node));
                    edited.insert(id);
                }
            }
        }

        let snapshot = if edited.is_empty() {
            Rc::clone(parent)
        } else {
            let memo = parent.carried_read_memo(&edited);
            Rc::new(GraphSnapshot::with_read_memo(nodes, memo))
        };
        debug!(
            edited = edited.len(),
            collected = deleted.len(),
            nodes = snapshot.len(),
            "editor committed"
        );
        EditorCommit {
            snapshot,
            edited_node_ids: edited,
            written_selections: written,
        }
    }

    fn merge_fields(
        &mut self,
        container: &NodeId,
        base: &FieldPath,
        object: &Map<String, Value>,
        fields: &SelectionSet,
        walk: Walk<'_>,
        trail: &FieldPath,
    ) -> Result<(), CacheError> {
        for field in fields.iter() {
            if !field.is_included(walk.variables) {
                continue;
            }
            let key = field.response_key();
            let field_trail = trail.child_key(key);
            // An absent field clears the stored value, like an explicit null.
            let value = match object.get(key) {
                Some(value) => value,
                None if self.context.config().strict => {
                    return Err(CacheError::MissingField {
                        path: field_trail.to_string(),
                    });
                }
                None => {
                    trace!(field = %field_trail, "payload omits selected field; stored as null");
                    &ABSENT
                }
            };
            let path = base.child_key(field.name());
            let field_walk = Walk {
                variables: walk.variables,
                expects_identity: field.expects_identity(),
            };
            if let Some(args) = field.parameterized_arguments(walk.variables) {
                let param = NodeId::parameterized(container, &path, &args);
                self.ensure_node(&param, NodeVariant::ParameterizedValue);
                self.link(container, &param, &path);
                self.merge_value(
                    &param,
                    &FieldPath::root(),
                    value,
                    field.children(),
                    field_walk,
                    &field_trail,
                )?;
            } else if field.is_static() {
                self.merge_value(container, &path, value, None, field_walk, &field_trail)?;
            } else {
                self.merge_value(
                    container,
                    &path,
                    value,
                    field.children(),
                    field_walk,
                    &field_trail,
                )?;
            }
        }
        Ok(())
    }

    fn merge_value(
        &mut self,
        container: &NodeId,
        path: &FieldPath,
        value: &Value,
        children: Option<&SelectionSet>,
        walk: Walk<'_>,
        trail: &FieldPath,
    ) -> Result<(), CacheError> {
        let Some(children) = children else {
            self.unlink_plain(container, path);
            self.set_data(container, path, value.clone());
            return Ok(());
        };
        match value {
            Value::Null => {
                self.unlink_plain(container, path);
                self.set_data(container, path, Value::Null);
                Ok(())
            }
            Value::Array(items) => {
                let len = items.len();
                self.unlink(container, |r, variant| {
                    (r.path == *path && variant == NodeVariant::Entity)
                        || child_step(&r.path, path).is_some_and(
                            |step| !matches!(step, PathPart::Index(i) if *i < len),
                        )
                });
                self.resize_array(container, path, len);
                for (i, item) in items.iter().enumerate() {
                    self.merge_value(
                        container,
                        &path.child_index(i),
                        item,
                        Some(children),
                        walk,
                        &trail.child_index(i),
                    )?;
                }
                Ok(())
            }
            Value::Object(object) => match self.context.entity_id(object) {
                Err(reason) => Err(CacheError::Identity {
                    path: trail.to_string(),
                    reason,
                }),
                Ok(Some(id)) => {
                    self.set_reference(container, path, &id);
                    self.merge_fields(&id, &FieldPath::root(), object, children, walk, trail)
                }
                Ok(None) if walk.expects_identity => Err(CacheError::Identity {
                    path: trail.to_string(),
                    reason: format!("object has no `{}`", self.context.config().id_field),
                }),
                Ok(None) => {
                    self.unlink(container, |r, variant| {
                        (r.path == *path && variant == NodeVariant::Entity)
                            || matches!(child_step(&r.path, path), Some(PathPart::Index(_)))
                    });
                    self.ensure_object(container, path);
                    self.merge_fields(container, path, object, children, walk, trail)
                }
            },
            scalar => Err(CacheError::Shape {
                path: trail.to_string(),
                expected: "object or array",
                found: value_kind(scalar),
            }),
        }
    }

    fn node(&self, id: &NodeId) -> Option<&NodeSnapshot> {
        self.working.get(id).or_else(|| self.parent.get(id))
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut NodeSnapshot> {
        let parent = self.parent;
        match self.working.entry(id.clone()) {
            Entry::Occupied(e) => Some(e.into_mut()),
            Entry::Vacant(e) => parent.get(id).map(move |n| e.insert(n.clone())),
        }
    }

    fn ensure_node(&mut self, id: &NodeId, variant: NodeVariant) -> &mut NodeSnapshot {
        let parent = self.parent;
        self.working.entry(id.clone()).or_insert_with(|| {
            parent
                .get(id)
                .cloned()
                .unwrap_or_else(|| NodeSnapshot::from_parts(variant, NodeParts::default()))
        })
    }

    fn ensure_entity(&mut self, id: &NodeId) {
        let node = self.ensure_node(id, NodeVariant::Entity);
        let data = &mut node.parts_mut().data;
        if data.is_none() {
            *data = Some(Value::Object(Map::new()));
        }
    }

    fn set_data(&mut self, container: &NodeId, path: &FieldPath, value: Value) {
        let unchanged = self
            .node(container)
            .and_then(NodeSnapshot::data)
            .and_then(|d| value_at(d, path.parts()))
            .is_some_and(|current| *current == value);
        if unchanged {
            return;
        }
        if let Some(node) = self.node_mut(container) {
            *slot_at(&mut node.parts_mut().data, path.parts()) = value;
        }
    }

    fn ensure_object(&mut self, container: &NodeId, path: &FieldPath) {
        let is_object = self
            .node(container)
            .and_then(NodeSnapshot::data)
            .and_then(|d| value_at(d, path.parts()))
            .is_some_and(Value::is_object);
        if !is_object {
            self.set_data(container, path, Value::Object(Map::new()));
        }
    }

    fn resize_array(&mut self, container: &NodeId, path: &FieldPath, len: usize) {
        let fits = self
            .node(container)
            .and_then(NodeSnapshot::data)
            .and_then(|d| value_at(d, path.parts()))
            .and_then(Value::as_array)
            .is_some_and(|items| items.len() == len);
        if fits {
            return;
        }
        if let Some(node) = self.node_mut(container) {
            let slot = slot_at(&mut node.parts_mut().data, path.parts());
            match slot {
                Value::Array(items) => items.resize(len, Value::Null),
                other => *other = Value::Array(vec![Value::Null; len]),
            }
        }
    }

    fn set_reference(&mut self, container: &NodeId, path: &FieldPath, target: &NodeId) {
        let already = self.node(container).is_some_and(|n| {
            n.outbound()
                .iter()
                .any(|r| r.path == *path && r.id == *target)
        });
        self.ensure_entity(target);
        if already {
            return;
        }
        self.unlink_plain(container, path);
        self.link(container, target, path);
        self.set_data(container, path, Value::Null);
    }

    fn link(&mut self, container: &NodeId, target: &NodeId, path: &FieldPath) {
        if let Some(node) = self.node_mut(container) {
            node.add_outbound(NodeReference::new(target.clone(), path.clone()));
        }
        if let Some(node) = self.node_mut(target) {
            node.add_inbound(NodeReference::new(container.clone(), path.clone()));
        }
    }

    /// Drops every reference at or below `path`, except an argument variant
    /// of the field at exactly `path`.
    fn unlink_plain(&mut self, container: &NodeId, path: &FieldPath) {
        self.unlink(container, |r, variant| {
            r.path.starts_with(path)
                && !(r.path == *path && variant == NodeVariant::ParameterizedValue)
        });
    }

    fn unlink(&mut self, container: &NodeId, doomed: impl Fn(&NodeReference, NodeVariant) -> bool) {
        let Some(node) = self.node(container) else {
            return;
        };
        let removed: Vec<NodeReference> = node
            .outbound()
            .iter()
            .filter(|r| {
                let variant = self
                    .node(&r.id)
                    .map_or(NodeVariant::Entity, NodeSnapshot::variant);
                doomed(r, variant)
            })
            .cloned()
            .collect();
        for reference in removed {
            if let Some(node) = self.node_mut(container) {
                node.remove_outbound(&reference);
            }
            let mirror = NodeReference::new(container.clone(), reference.path);
            if let Some(target) = self.node_mut(&reference.id) {
                target.remove_inbound(&mirror);
            }
            self.orphan_candidates.push(reference.id);
        }
    }

    /// Deletes candidates left without inbound edges, transitively.
    ///
    /// Root sentinels are never deleted. A group of nodes that only reference
    /// each other keeps non-empty inbound sets and survives.
    fn collect_orphans(&mut self) -> BTreeSet<NodeId> {
        let mut deleted = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = std::mem::take(&mut self.orphan_candidates).into();
        while let Some(id) = queue.pop_front() {
            if id.is_root() || deleted.contains(&id) {
                continue;
            }
            let Some(node) = self.node(&id) else {
                continue;
            };
            if !node.inbound().is_empty() {
                continue;
            }
            let outbound = node.outbound().to_vec();
            deleted.insert(id.clone());
            trace!(node = %id, "collecting orphan");
            for reference in outbound {
                let mirror = NodeReference::new(id.clone(), reference.path);
                if let Some(target) = self.node_mut(&reference.id) {
                    target.remove_inbound(&mirror);
                }
                queue.push_back(reference.id);
            }
        }
        deleted
    }
}

/// The first step of `path` below `base`, if `path` lies strictly under it.
fn child_step<'p>(path: &'p FieldPath, base: &FieldPath) -> Option<&'p PathPart> {
    if path.starts_with(base) {
        path.parts().get(base.len())
    } else {
        None
    }
}
