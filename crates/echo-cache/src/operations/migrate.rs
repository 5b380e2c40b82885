// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema migration of stored data.
//!
//! A [`MigrationMap`] names, per entity type, field transforms to run over
//! existing data and parameterized fields to back-fill with a default value.
//! The query root is addressed by the type name [`QUERY_TYPENAME`].
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::CacheContext;
use crate::graph::GraphSnapshot;
use crate::ident::NodeId;
use crate::node::{NodeParts, NodeSnapshot, NodeVariant};
use crate::path::{FieldPath, NodeReference};
use crate::snapshot::CacheSnapshot;

/// Type name that selects the query root in a [`MigrationMap`].
pub const QUERY_TYPENAME: &str = "Query";

/// Maps a field's previous value (absent if never stored) to its new value.
pub type FieldTransform = Box<dyn Fn(Option<&Value>) -> Value>;

/// A parameterized field to create wherever it is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedTransform {
    /// Field path on the container.
    pub path: FieldPath,
    /// Arguments the field is stored under.
    pub args: Map<String, Value>,
    /// Value stored in newly created nodes.
    pub default_return: Value,
}

/// Migration instructions keyed by entity type name.
#[derive(Default)]
pub struct MigrationMap {
    entity_transforms: BTreeMap<String, BTreeMap<String, FieldTransform>>,
    parameterized_transforms: BTreeMap<String, Vec<ParameterizedTransform>>,
}

impl MigrationMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites `field` of every `typename` entity with `transform`.
    #[must_use]
    pub fn with_entity_transform(
        mut self,
        typename: impl Into<String>,
        field: impl Into<String>,
        transform: impl Fn(Option<&Value>) -> Value + 'static,
    ) -> Self {
        self.entity_transforms
            .entry(typename.into())
            .or_default()
            .insert(field.into(), Box::new(transform));
        self
    }

    /// Creates the parameterized field `path(args)` with `default_return` on
    /// every `typename` container that lacks it.
    #[must_use]
    pub fn with_parameterized_default(
        mut self,
        typename: impl Into<String>,
        path: FieldPath,
        args: Map<String, Value>,
        default_return: Value,
    ) -> Self {
        self.parameterized_transforms
            .entry(typename.into())
            .or_default()
            .push(ParameterizedTransform {
                path,
                args,
                default_return,
            });
        self
    }

    /// Returns `true` when the map migrates nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_transforms.is_empty() && self.parameterized_transforms.is_empty()
    }
}

impl fmt::Debug for MigrationMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: BTreeMap<&String, Vec<&String>> = self
            .entity_transforms
            .iter()
            .map(|(t, fields)| (t, fields.keys().collect()))
            .collect();
        f.debug_struct("MigrationMap")
            .field("entity_transforms", &fields)
            .field("parameterized_transforms", &self.parameterized_transforms)
            .finish()
    }
}

/// Applies `migration` to the baseline and the optimistic view.
///
/// The optimistic queue is kept as is; replaying it later writes over the
/// migrated baseline.
pub fn migrate(
    context: &CacheContext,
    snapshot: &CacheSnapshot,
    migration: &MigrationMap,
) -> CacheSnapshot {
    if migration.is_empty() {
        return snapshot.clone();
    }
    let baseline = migrate_graph(context, snapshot.baseline(), migration);
    let optimistic = if Rc::ptr_eq(snapshot.baseline(), snapshot.optimistic()) {
        Rc::clone(&baseline)
    } else {
        migrate_graph(context, snapshot.optimistic(), migration)
    };
    CacheSnapshot::from_parts(baseline, optimistic, snapshot.optimistic_queue().clone())
}

fn migrate_graph(
    context: &CacheContext,
    graph: &Rc<GraphSnapshot>,
    migration: &MigrationMap,
) -> Rc<GraphSnapshot> {
    let typename_field = context.config().typename_field.as_str();
    let mut changed: BTreeMap<NodeId, NodeSnapshot> = BTreeMap::new();
    for (id, node) in graph.iter() {
        if node.variant() != NodeVariant::Entity {
            continue;
        }
        let Some(typename) = typename_of(id, node, typename_field) else {
            continue;
        };
        let mut copy = node.clone();
        if let Some(transforms) = migration.entity_transforms.get(typename) {
            transform_fields(id, &mut copy, transforms);
        }
        for param in migration
            .parameterized_transforms
            .get(typename)
            .into_iter()
            .flatten()
        {
            let param_id = NodeId::parameterized(id, &param.path, &param.args);
            if graph.contains(&param_id) {
                continue;
            }
            let mut created = NodeSnapshot::from_parts(
                NodeVariant::ParameterizedValue,
                NodeParts::with_data(Some(param.default_return.clone())),
            );
            created.add_inbound(NodeReference::new(id.clone(), param.path.clone()));
            copy.add_outbound(NodeReference::new(param_id.clone(), param.path.clone()));
            changed.insert(param_id, created);
        }
        if copy != *node {
            changed.insert(id.clone(), copy);
        }
    }
    if changed.is_empty() {
        return Rc::clone(graph);
    }
    let edited: BTreeSet<NodeId> = changed.keys().cloned().collect();
    let mut nodes = graph.nodes().clone();
    for (id, node) in changed {
        nodes.insert(id, Rc::new(node));
    }
    debug!(edited = edited.len(), "migration applied");
    Rc::new(GraphSnapshot::with_read_memo(
        nodes,
        graph.carried_read_memo(&edited),
    ))
}

fn typename_of<'n>(id: &NodeId, node: &'n NodeSnapshot, typename_field: &str) -> Option<&'n str> {
    if *id == NodeId::query_root() {
        Some(QUERY_TYPENAME)
    } else {
        node.string_field(typename_field)
    }
}

fn transform_fields(id: &NodeId, node: &mut NodeSnapshot, transforms: &BTreeMap<String, FieldTransform>) {
    for (field, transform) in transforms {
        let path = FieldPath::root().child_key(field);
        if node.outbound().iter().any(|r| r.path.starts_with(&path)) {
            warn!(node = %id, field = %field, "field holds references; migration skipped");
            continue;
        }
        let data = node
            .parts_mut()
            .data
            .get_or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(object) = data {
            let next = transform(object.get(field));
            object.insert(field.clone(), next);
        }
    }
}
