// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cache configuration and the collaborators a host supplies.
//!
//! [`CacheConfig`] is plain serde data and can be loaded from JSON.
//! [`CacheContext`] adds the pieces that cannot be serialized: the entity id
//! resolver, per-type entity update callbacks, and tracing hooks.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CacheError;
use crate::ident::NodeId;
use crate::path::{value_kind, NodeReference};
use crate::selection::Selection;
use crate::tx::TxId;

/// Serializable cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Payload field holding an entity's id.
    pub id_field: String,
    /// Payload field holding an entity's type name.
    pub typename_field: String,
    /// Prefix entity ids with their type name (`User:1`).
    pub namespace_ids_by_typename: bool,
    /// Treat a selected field missing from a payload as an error instead of
    /// leaving the stored value untouched.
    pub strict: bool,
    /// Upper bound on memoized read results per graph snapshot
    /// (`0` disables memoization).
    pub max_read_cache_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_owned(),
            typename_field: "__typename".to_owned(),
            namespace_ids_by_typename: false,
            strict: false,
            max_read_cache_entries: 1024,
        }
    }
}

impl CacheConfig {
    /// Parses a JSON config blob; absent fields take their defaults.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, CacheError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Derives entity ids from payload objects.
pub trait EntityIdResolver {
    /// Returns the id of `object`, `Ok(None)` if it is not an entity, or an
    /// error message if it carries an id that cannot be used.
    fn entity_id(&self, object: &Map<String, Value>) -> Result<Option<NodeId>, String>;
}

/// Default resolver: reads [`CacheConfig::id_field`], accepting strings and
/// integers, optionally namespaced by [`CacheConfig::typename_field`].
#[derive(Debug, Clone)]
pub struct DefaultEntityIds {
    id_field: String,
    typename_field: String,
    namespace: bool,
}

impl DefaultEntityIds {
    /// Builds the resolver described by `config`.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            id_field: config.id_field.clone(),
            typename_field: config.typename_field.clone(),
            namespace: config.namespace_ids_by_typename,
        }
    }
}

impl EntityIdResolver for DefaultEntityIds {
    fn entity_id(&self, object: &Map<String, Value>) -> Result<Option<NodeId>, String> {
        let raw = match object.get(&self.id_field) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            Some(other) => {
                return Err(format!(
                    "`{}` must be a string or an integer, found {}",
                    self.id_field,
                    value_kind(other)
                ))
            }
        };
        let typename = object.get(&self.typename_field).and_then(Value::as_str);
        match typename {
            Some(t) if self.namespace => Ok(Some(NodeId::new(format!("{t}:{raw}")))),
            _ => Ok(Some(NodeId::new(raw))),
        }
    }
}

/// Change notification delivered to entity update callbacks.
///
/// Data is the stored form: a field holding another entity reads as `null`.
/// The matching `*_references` list has an edge at that field's path naming
/// the entity it points to.
#[derive(Debug, Clone, Copy)]
pub struct EntityUpdate<'a> {
    /// Edited entity.
    pub id: &'a NodeId,
    /// The entity's type name.
    pub typename: &'a str,
    /// Data before the transaction (`None` if the entity is new).
    pub previous: Option<&'a Value>,
    /// Data after the transaction (`None` if the entity was collected).
    pub current: Option<&'a Value>,
    /// Outbound edges before the transaction.
    pub previous_references: &'a [NodeReference],
    /// Outbound edges after the transaction.
    pub current_references: &'a [NodeReference],
}

/// Callback invoked after commit for every edited entity of one type.
pub type EntityUpdater = Box<dyn Fn(&EntityUpdate<'_>)>;

/// Observational hooks around cache boundaries. All methods default to no-ops
/// and have no effect on outcomes.
pub trait CacheTracer {
    /// A transaction was opened.
    fn transaction_start(&self, _tx: TxId) {}
    /// A transaction finished; `committed` is `false` when it was discarded.
    fn transaction_end(&self, _tx: TxId, _committed: bool, _edited_nodes: usize) {}
    /// A selection was written inside a transaction.
    fn write_end(&self, _selection: &Selection, _edited_nodes: usize) {}
    /// A selection was read; `memoized` is `true` for read-cache hits.
    fn read_end(&self, _selection: &Selection, _complete: bool, _memoized: bool) {}
}

/// Tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl CacheTracer for NoopTracer {}

/// Everything an engine operation needs besides its inputs.
pub struct CacheContext {
    config: CacheConfig,
    id_resolver: Box<dyn EntityIdResolver>,
    entity_updaters: BTreeMap<String, Vec<EntityUpdater>>,
    tracer: Box<dyn CacheTracer>,
}

impl CacheContext {
    /// Context with the default id resolver and no hooks.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let id_resolver = Box::new(DefaultEntityIds::from_config(&config));
        Self {
            config,
            id_resolver,
            entity_updaters: BTreeMap::new(),
            tracer: Box::new(NoopTracer),
        }
    }

    /// Replaces the entity id resolver.
    #[must_use]
    pub fn with_id_resolver(mut self, resolver: impl EntityIdResolver + 'static) -> Self {
        self.id_resolver = Box::new(resolver);
        self
    }

    /// Registers a callback for edited entities whose type name is `typename`.
    #[must_use]
    pub fn with_entity_updater(
        mut self,
        typename: impl Into<String>,
        updater: impl Fn(&EntityUpdate<'_>) + 'static,
    ) -> Self {
        self.entity_updaters
            .entry(typename.into())
            .or_default()
            .push(Box::new(updater));
        self
    }

    /// Replaces the tracer.
    #[must_use]
    pub fn with_tracer(mut self, tracer: impl CacheTracer + 'static) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    /// Settings in effect.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Resolves the entity id of `object`.
    pub fn entity_id(&self, object: &Map<String, Value>) -> Result<Option<NodeId>, String> {
        self.id_resolver.entity_id(object)
    }

    pub(crate) fn tracer(&self) -> &dyn CacheTracer {
        self.tracer.as_ref()
    }

    pub(crate) fn has_entity_updaters(&self) -> bool {
        !self.entity_updaters.is_empty()
    }

    pub(crate) fn entity_updaters(&self, typename: &str) -> &[EntityUpdater] {
        self.entity_updaters
            .get(typename)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Default for CacheContext {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheContext")
            .field("config", &self.config)
            .field(
                "entity_updaters",
                &self.entity_updaters.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
