// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cuts a graph down to what a selection reads.
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::graph::GraphSnapshot;
use crate::ident::NodeId;
use crate::node::{NodeParts, NodeSnapshot};
use crate::operations::read::evaluate;
use crate::path::{slot_at, value_at, FieldPath, NodeReference};
use crate::selection::{Selection, SelectionSet};

/// Result of [`prune`].
#[derive(Debug)]
pub struct PruneResult {
    /// The projected subgraph.
    pub snapshot: GraphSnapshot,
    /// Whether the selection was fully satisfied by the source graph.
    pub complete: bool,
}

/// Projects `graph` onto `selection`.
///
/// Only the nodes the selection reaches survive, and each keeps only the
/// selected fields: unselected values and the references under them are
/// dropped. Array lengths are kept, so a reference inside a list stays at
/// its index. Nodes whose data and edges come through unchanged are shared
/// with `graph`.
pub fn prune(graph: &GraphSnapshot, selection: &Selection) -> PruneResult {
    let mut projector = Projector {
        graph,
        variables: selection.variables(),
        kept: BTreeMap::new(),
    };
    projector.visit_entity(selection.root_id(), selection.fields());
    let kept = projector.kept;

    let mut nodes = BTreeMap::new();
    for (id, projection) in &kept {
        let Some(original) = graph.node_rc(id) else {
            continue;
        };
        let outbound: Vec<NodeReference> = original
            .outbound()
            .iter()
            .filter(|r| projection.outbound.contains(r))
            .cloned()
            .collect();
        let inbound: Vec<NodeReference> = original
            .inbound()
            .iter()
            .filter(|r| {
                kept.get(&r.id).is_some_and(|p| {
                    p.outbound
                        .contains(&NodeReference::new(id.clone(), r.path.clone()))
                })
            })
            .cloned()
            .collect();
        let unchanged = original.data() == projection.data.as_ref()
            && original.outbound() == outbound.as_slice()
            && original.inbound() == inbound.as_slice();
        let node = if unchanged {
            Rc::clone(original)
        } else {
            Rc::new(NodeSnapshot::from_parts(
                original.variant(),
                NodeParts {
                    data: projection.data.clone(),
                    inbound,
                    outbound,
                },
            ))
        };
        nodes.insert(id.clone(), node);
    }

    PruneResult {
        snapshot: GraphSnapshot::from_nodes(nodes),
        complete: evaluate(selection, graph).complete,
    }
}

/// Selected data and traversed edges of one node.
#[derive(Default)]
struct Projection {
    data: Option<Value>,
    outbound: BTreeSet<NodeReference>,
}

struct Projector<'g> {
    graph: &'g GraphSnapshot,
    variables: &'g Map<String, Value>,
    kept: BTreeMap<NodeId, Projection>,
}

impl Projector<'_> {
    fn keep(&mut self, id: &NodeId) -> &mut Projection {
        self.kept.entry(id.clone()).or_default()
    }

    fn visit_entity(&mut self, id: &NodeId, fields: &SelectionSet) {
        let graph = self.graph;
        if !graph.contains(id) {
            return;
        }
        let is_object = graph.node_data(id).is_some_and(Value::is_object);
        let projection = self.keep(id);
        if is_object && !projection.data.as_ref().is_some_and(Value::is_object) {
            projection.data = Some(Value::Object(Map::new()));
        }
        self.visit_fields(id, &FieldPath::root(), fields);
    }

    fn visit_fields(&mut self, container: &NodeId, base: &FieldPath, fields: &SelectionSet) {
        for field in fields.iter() {
            if !field.is_included(self.variables) {
                continue;
            }
            let path = base.child_key(field.name());
            if let Some(args) = field.parameterized_arguments(self.variables) {
                let param = NodeId::parameterized(container, &path, &args);
                if self.graph.contains(&param) {
                    self.keep(container)
                        .outbound
                        .insert(NodeReference::new(param.clone(), path));
                    self.keep(&param);
                    self.visit_at(&param, &FieldPath::root(), field.children());
                }
            } else if field.is_static() {
                self.visit_at(container, &path, None);
            } else {
                self.visit_at(container, &path, field.children());
            }
        }
    }

    fn visit_at(&mut self, node: &NodeId, path: &FieldPath, children: Option<&SelectionSet>) {
        let graph = self.graph;
        if let Some(children) = children {
            if let Some(target) = graph.entity_reference_at(node, path) {
                if graph.contains(target) {
                    let projection = self.keep(node);
                    *slot_at(&mut projection.data, path.parts()) = Value::Null;
                    projection
                        .outbound
                        .insert(NodeReference::new(target.clone(), path.clone()));
                    self.visit_entity(target, children);
                }
                return;
            }
        }
        let Some(value) = graph
            .node_data(node)
            .and_then(|data| value_at(data, path.parts()))
        else {
            return;
        };
        let projection = self.keep(node);
        let Some(children) = children else {
            *slot_at(&mut projection.data, path.parts()) = value.clone();
            return;
        };
        match value {
            Value::Null => *slot_at(&mut projection.data, path.parts()) = Value::Null,
            Value::Array(items) => {
                let slot = slot_at(&mut projection.data, path.parts());
                if slot.as_array().is_none_or(|a| a.len() != items.len()) {
                    *slot = Value::Array(vec![Value::Null; items.len()]);
                }
                for i in 0..items.len() {
                    self.visit_at(node, &path.child_index(i), Some(children));
                }
            }
            Value::Object(_) => {
                let slot = slot_at(&mut projection.data, path.parts());
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                self.visit_fields(node, path, children);
            }
            // Scalar under a sub-selection: nothing readable to keep.
            _ => {}
        }
    }
}
