// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use echo_cache::{Cache, NodeId, Selection, SelectionField};
use serde_json::{Map, Value};

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Leaf field.
pub fn leaf(name: &str) -> SelectionField {
    SelectionField::new(name)
}

/// Field with a sub-selection.
pub fn obj(name: &str, children: Vec<SelectionField>) -> SelectionField {
    SelectionField::object(name, children)
}

/// `{ <name> { id name } }` rooted at the query root.
pub fn entity_selection(name: &str) -> Selection {
    Selection::query(vec![obj(name, vec![leaf("id"), leaf("name")])])
}

/// Converts a `json!` object literal into a variables map.
pub fn vars(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub fn id(raw: &str) -> NodeId {
    NodeId::new(raw)
}

/// Ids in the current baseline, ascending.
pub fn baseline_ids(cache: &Cache) -> Vec<String> {
    cache
        .snapshot()
        .baseline()
        .all_node_ids()
        .map(ToString::to_string)
        .collect()
}
