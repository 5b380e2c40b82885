// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reassembles JSON results by walking a graph snapshot along a selection.
use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::context::CacheContext;
use crate::graph::GraphSnapshot;
use crate::ident::NodeId;
use crate::path::{value_at, FieldPath};
use crate::selection::{Selection, SelectionSet};

/// Outcome of reading one selection from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    /// Assembled result; `None` when the selection's root node is absent.
    pub result: Option<Value>,
    /// `false` if any selected value was missing from the graph.
    pub complete: bool,
    /// Every node the read depended on, including nodes it looked for and
    /// did not find.
    pub touched_node_ids: BTreeSet<NodeId>,
}

/// Reads `selection` from `snapshot`, memoizing the result on the snapshot.
///
/// A snapshot derived by an edit carries forward every memoized result whose
/// touched set is disjoint from the edit, so repeated reads of unaffected
/// selections return the same `Rc`.
pub fn read(context: &CacheContext, selection: &Selection, snapshot: &GraphSnapshot) -> Rc<ReadResult> {
    if let Some(hit) = snapshot.memoized(selection.key()) {
        context.tracer().read_end(selection, hit.complete, true);
        return hit;
    }
    let result = Rc::new(evaluate(selection, snapshot));
    snapshot.memoize(
        selection.key(),
        Rc::clone(&result),
        context.config().max_read_cache_entries,
    );
    context.tracer().read_end(selection, result.complete, false);
    result
}

/// Reads without consulting or filling the memo.
pub(crate) fn evaluate(selection: &Selection, snapshot: &GraphSnapshot) -> ReadResult {
    let mut reader = Reader {
        graph: snapshot,
        variables: selection.variables(),
        complete: true,
        touched: BTreeSet::new(),
    };
    let root = selection.root_id();
    reader.touched.insert(root.clone());
    let result = if snapshot.contains(root) {
        let mut out = Map::new();
        reader.read_fields(root, &FieldPath::root(), selection.fields(), &mut out);
        Some(Value::Object(out))
    } else {
        reader.complete = false;
        None
    };
    ReadResult {
        result,
        complete: reader.complete,
        touched_node_ids: reader.touched,
    }
}

struct Reader<'a> {
    graph: &'a GraphSnapshot,
    variables: &'a Map<String, Value>,
    complete: bool,
    touched: BTreeSet<NodeId>,
}

impl Reader<'_> {
    fn read_fields(
        &mut self,
        container: &NodeId,
        base: &FieldPath,
        fields: &SelectionSet,
        out: &mut Map<String, Value>,
    ) {
        for field in fields.iter() {
            if !field.is_included(self.variables) {
                continue;
            }
            let path = base.child_key(field.name());
            let value = match field.parameterized_arguments(self.variables) {
                Some(args) => {
                    let param = NodeId::parameterized(container, &path, &args);
                    self.touched.insert(param.clone());
                    if self.graph.contains(&param) {
                        self.read_at(&param, &FieldPath::root(), field.children())
                    } else {
                        None
                    }
                }
                None if field.is_static() => self.read_at(container, &path, None),
                None => self.read_at(container, &path, field.children()),
            };
            match value {
                Some(v) => {
                    out.insert(field.response_key().to_owned(), v);
                }
                None => self.complete = false,
            }
        }
    }

    fn read_at(
        &mut self,
        node: &NodeId,
        path: &FieldPath,
        children: Option<&SelectionSet>,
    ) -> Option<Value> {
        if let Some(children) = children {
            if let Some(target) = self.graph.entity_reference_at(node, path).cloned() {
                return self.read_entity(&target, children);
            }
        }
        let data = self.graph.node_data(node)?;
        let value = value_at(data, path.parts())?;
        let Some(children) = children else {
            return Some(value.clone());
        };
        match value {
            Value::Null => Some(Value::Null),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for i in 0..items.len() {
                    let item = self.read_at(node, &path.child_index(i), Some(children));
                    if item.is_none() {
                        self.complete = false;
                    }
                    out.push(item.unwrap_or(Value::Null));
                }
                Some(Value::Array(out))
            }
            Value::Object(_) => {
                let mut out = Map::new();
                self.read_fields(node, path, children, &mut out);
                Some(Value::Object(out))
            }
            // A scalar where a sub-selection expects structure is not an answer.
            _ => None,
        }
    }

    fn read_entity(&mut self, id: &NodeId, children: &SelectionSet) -> Option<Value> {
        self.touched.insert(id.clone());
        if !self.graph.contains(id) {
            return None;
        }
        let mut out = Map::new();
        self.read_fields(id, &FieldPath::root(), children, &mut out);
        Some(Value::Object(out))
    }
}
