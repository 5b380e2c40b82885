// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Selection trees: the parsed shape of a query as the cache consumes it.
//!
//! Parsing a query document is the caller's job. The cache only needs field
//! names, aliases, sub-selections, directives, and argument expressions, which
//! are resolved against the selection's variables on use.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ident::{canonicalize, NodeId};

/// An argument expression attached to a field or directive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentValue {
    /// Inline constant.
    Literal(Value),
    /// Reference to a variable by name.
    Variable(String),
    /// List of nested expressions.
    List(Vec<ArgumentValue>),
    /// Object of nested expressions.
    Object(BTreeMap<String, ArgumentValue>),
}

impl ArgumentValue {
    /// Resolves the expression against `variables`.
    ///
    /// Returns `None` when a top-level variable is not provided, which omits
    /// the argument. Missing variables nested inside lists or objects resolve
    /// to `null`.
    pub fn resolve(&self, variables: &Map<String, Value>) -> Option<Value> {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Variable(name) => variables.get(name).cloned(),
            Self::List(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|i| i.resolve(variables).unwrap_or(Value::Null))
                    .collect(),
            )),
            Self::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.resolve(variables).unwrap_or(Value::Null)))
                    .collect(),
            )),
        }
    }
}

/// Directives the cache understands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDirective {
    /// Store the field verbatim on its container: no normalization and no
    /// parameterized node even when the field has arguments.
    Static,
    /// `@skip(if: ...)`.
    Skip(ArgumentValue),
    /// `@include(if: ...)`.
    Include(ArgumentValue),
}

/// One selected field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectionField {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    arguments: BTreeMap<String, ArgumentValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    directives: Vec<FieldDirective>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    expects_identity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<SelectionSet>,
}

impl SelectionField {
    /// A leaf field named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: BTreeMap::new(),
            directives: Vec::new(),
            expects_identity: false,
            children: None,
        }
    }

    /// A field named `name` with a sub-selection.
    pub fn object(name: impl Into<String>, children: Vec<Self>) -> Self {
        Self::new(name).with_children(children)
    }

    /// Sets the response alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an argument expression.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Adds a literal argument.
    #[must_use]
    pub fn literal_arg(self, name: impl Into<String>, value: Value) -> Self {
        self.arg(name, ArgumentValue::Literal(value))
    }

    /// Adds an argument bound to `variable`.
    #[must_use]
    pub fn variable_arg(self, name: impl Into<String>, variable: impl Into<String>) -> Self {
        self.arg(name, ArgumentValue::Variable(variable.into()))
    }

    /// Attaches a directive.
    #[must_use]
    pub fn directive(mut self, directive: FieldDirective) -> Self {
        self.directives.push(directive);
        self
    }

    /// Marks the field as static (see [`FieldDirective::Static`]).
    #[must_use]
    pub fn stored_statically(self) -> Self {
        self.directive(FieldDirective::Static)
    }

    /// Requires objects written under this field to carry an identity.
    #[must_use]
    pub fn expecting_identity(mut self) -> Self {
        self.expects_identity = true;
        self
    }

    /// Replaces the sub-selection.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = Some(SelectionSet::new(children));
        self
    }

    /// Field name in the schema; also the key used in stored node data.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key used in payloads and read results (alias, else name).
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Sub-selection, if any.
    #[must_use]
    pub fn children(&self) -> Option<&SelectionSet> {
        self.children.as_ref()
    }

    /// Whether objects under this field must resolve to an entity id.
    #[must_use]
    pub fn expects_identity(&self) -> bool {
        self.expects_identity
    }

    /// Whether the field carries the static directive.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.directives
            .iter()
            .any(|d| matches!(d, FieldDirective::Static))
    }

    /// Evaluates `@skip` / `@include` against `variables`.
    #[must_use]
    pub fn is_included(&self, variables: &Map<String, Value>) -> bool {
        self.directives.iter().all(|d| match d {
            FieldDirective::Static => true,
            FieldDirective::Skip(cond) => cond.resolve(variables) != Some(Value::Bool(true)),
            FieldDirective::Include(cond) => cond.resolve(variables) != Some(Value::Bool(false)),
        })
    }

    /// Resolved argument map for a parameterized field.
    ///
    /// Returns `None` for static fields and for fields whose arguments all
    /// resolve to nothing; such fields are stored directly on their container.
    #[must_use]
    pub fn parameterized_arguments(&self, variables: &Map<String, Value>) -> Option<Map<String, Value>> {
        if self.arguments.is_empty() || self.is_static() {
            return None;
        }
        let resolved: Map<String, Value> = self
            .arguments
            .iter()
            .filter_map(|(k, v)| v.resolve(variables).map(|v| (k.clone(), v)))
            .collect();
        if resolved.is_empty() {
            None
        } else {
            Some(resolved)
        }
    }
}

/// Ordered list of selected fields.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet(Vec<SelectionField>);

impl SelectionSet {
    /// Wraps `fields`.
    #[must_use]
    pub fn new(fields: Vec<SelectionField>) -> Self {
        Self(fields)
    }

    /// Iterates fields in selection order.
    pub fn iter(&self) -> impl Iterator<Item = &SelectionField> {
        self.0.iter()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no fields are selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A complete selection: root node, field tree, and variables.
///
/// Each selection carries a canonical key used to memoize read results per
/// [`crate::GraphSnapshot`]. Two selections with the same root, tree, and
/// (canonicalized) variables share a key.
#[derive(Clone, Debug)]
pub struct Selection {
    root_id: NodeId,
    fields: SelectionSet,
    variables: Map<String, Value>,
    key: String,
}

#[derive(Serialize)]
struct SelectionKey<'a> {
    root: &'a NodeId,
    fields: &'a SelectionSet,
    variables: Value,
}

impl Selection {
    /// Builds a selection rooted at `root_id`.
    #[must_use]
    pub fn new(root_id: NodeId, fields: Vec<SelectionField>) -> Self {
        Self::with_variables(root_id, fields, Map::new())
    }

    /// Builds a selection rooted at the query root.
    #[must_use]
    pub fn query(fields: Vec<SelectionField>) -> Self {
        Self::new(NodeId::query_root(), fields)
    }

    /// Builds a selection with variables.
    #[must_use]
    pub fn with_variables(
        root_id: NodeId,
        fields: Vec<SelectionField>,
        variables: Map<String, Value>,
    ) -> Self {
        let fields = SelectionSet::new(fields);
        let key = serde_json::to_string(&SelectionKey {
            root: &root_id,
            fields: &fields,
            variables: canonicalize(&Value::Object(variables.clone())),
        })
        .unwrap_or_default();
        Self {
            root_id,
            fields,
            variables,
            key,
        }
    }

    /// Node the selection starts from.
    #[must_use]
    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    /// Top-level fields.
    #[must_use]
    pub fn fields(&self) -> &SelectionSet {
        &self.fields
    }

    /// Variables used to resolve argument and directive expressions.
    #[must_use]
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Canonical memoization key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Selection {}
