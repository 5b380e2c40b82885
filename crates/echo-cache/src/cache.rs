// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The cache: current snapshot, transaction ids, and registered observers.
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::context::{CacheConfig, CacheContext, EntityUpdate};
use crate::error::CacheError;
use crate::ident::NodeId;
use crate::node::{NodeSnapshot, NodeVariant};
use crate::observer::{ObserverId, QueryObserver};
use crate::operations::extract::extract;
use crate::operations::migrate::{migrate, MigrationMap};
use crate::operations::read::{read, ReadResult};
use crate::operations::restore::restore;
use crate::selection::Selection;
use crate::serialized::SerializedCache;
use crate::snapshot::CacheSnapshot;
use crate::transaction::CacheTransaction;
use crate::tx::{ChangeId, TxId};

/// A normalized cache.
///
/// `Cache` owns the current [`CacheSnapshot`] and replaces it on every
/// committed transaction. Snapshots handed out earlier stay valid and
/// unchanged. Transactions borrow the cache mutably, so they cannot nest.
#[derive(Debug)]
pub struct Cache {
    context: CacheContext,
    snapshot: CacheSnapshot,
    observers: BTreeMap<ObserverId, QueryObserver>,
    last_tx: TxId,
    last_observer: u64,
}

impl Cache {
    /// An empty cache using `context`.
    pub fn new(context: CacheContext) -> Self {
        Self {
            context,
            snapshot: CacheSnapshot::default(),
            observers: BTreeMap::new(),
            last_tx: TxId::from_raw(0),
            last_observer: 0,
        }
    }

    /// An empty cache with default collaborators and `config`.
    pub fn with_config(config: CacheConfig) -> Self {
        Self::new(CacheContext::new(config))
    }

    /// Collaborators and settings in effect.
    pub fn context(&self) -> &CacheContext {
        &self.context
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    /// Reads `selection` from the optimistic view or the baseline.
    pub fn read(&self, selection: &Selection, optimistic: bool) -> Rc<ReadResult> {
        read(&self.context, selection, self.snapshot.view(optimistic))
    }

    /// Writes `payload` to the baseline in its own transaction.
    #[instrument(skip_all, fields(root = %selection.root_id()))]
    pub fn write(
        &mut self,
        selection: &Selection,
        payload: &Value,
    ) -> Result<BTreeSet<NodeId>, CacheError> {
        self.transaction(|tx| tx.write(selection, payload))
    }

    /// Writes `payload` optimistically, queued under `change_id`.
    #[instrument(skip_all, fields(change = %change_id, root = %selection.root_id()))]
    pub fn write_optimistic(
        &mut self,
        change_id: ChangeId,
        selection: &Selection,
        payload: &Value,
    ) -> Result<BTreeSet<NodeId>, CacheError> {
        self.transaction_with_change_id(change_id, |tx| tx.write(selection, payload))
    }

    /// Runs `body` in a baseline transaction.
    ///
    /// The transaction commits when `body` returns `Ok` and is discarded
    /// when it returns `Err`; in that case the current snapshot is unchanged
    /// and the error is returned as is.
    pub fn transaction<T, E>(
        &mut self,
        body: impl FnOnce(&mut CacheTransaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        self.run_transaction(None, body)
    }

    /// Runs `body` in an optimistic transaction whose writes are queued under
    /// `change_id`. Commits and discards like [`Cache::transaction`].
    pub fn transaction_with_change_id<T, E>(
        &mut self,
        change_id: ChangeId,
        body: impl FnOnce(&mut CacheTransaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        self.run_transaction(Some(change_id), body)
    }

    /// Drops the optimistic change `change_id` and recomputes the optimistic
    /// view from the baseline and the remaining queue.
    #[instrument(skip(self))]
    pub fn rollback(&mut self, change_id: &ChangeId) -> Result<BTreeSet<NodeId>, CacheError> {
        self.transaction(|tx| tx.rollback(change_id))
    }

    /// Registers an observer of `selection`.
    ///
    /// The observer records the current result but is not called until a
    /// later commit changes it.
    pub fn watch(
        &mut self,
        selection: Selection,
        optimistic: bool,
        callback: impl FnMut(&ReadResult) + 'static,
    ) -> ObserverId {
        self.last_observer += 1;
        let id = ObserverId::from_raw(self.last_observer);
        let mut observer = QueryObserver::new(selection, optimistic, callback);
        observer.prime(&self.context, &self.snapshot);
        self.observers.insert(id, observer);
        id
    }

    /// Removes an observer. Returns `false` if `id` was not registered.
    pub fn unwatch(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Replaces the cache's contents with `serialized`.
    ///
    /// `migration` runs over the restored graph; `verify` must then be fully
    /// satisfied by the baseline or the restore is rejected.
    ///
    /// # Errors
    /// [`CacheError::Restore`] if `serialized` is not a valid graph,
    /// [`CacheError::Verification`] if `verify` reads incomplete,
    /// [`CacheError::Codec`] if the restored graph cannot be encoded for its
    /// digest. The cache is unchanged on error.
    #[instrument(skip_all, fields(nodes = serialized.len()))]
    pub fn restore(
        &mut self,
        serialized: &SerializedCache,
        migration: Option<&MigrationMap>,
        verify: Option<&Selection>,
    ) -> Result<(), CacheError> {
        let mut snapshot = restore(serialized)?.snapshot;
        if let Some(migration) = migration {
            snapshot = migrate(&self.context, &snapshot, migration);
        }
        if let Some(selection) = verify {
            if !read(&self.context, selection, snapshot.baseline()).complete {
                return Err(CacheError::Verification {
                    root: selection.root_id().clone(),
                });
            }
        }
        let digest = snapshot.baseline().short_digest()?;
        let edited = self.changes_to(&snapshot);
        info!(
            nodes = snapshot.baseline().len(),
            edited = edited.len(),
            digest = %digest,
            "cache restored"
        );
        self.publish(snapshot, &edited);
        Ok(())
    }

    /// Serializes the optimistic view (or the baseline), optionally pruned to
    /// what `prune_to` reaches.
    pub fn extract(&self, optimistic: bool, prune_to: Option<&Selection>) -> SerializedCache {
        extract(&self.snapshot, optimistic, prune_to)
    }

    /// Empties the cache, including pending optimistic changes.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        let empty = CacheSnapshot::default();
        let edited = self.changes_to(&empty);
        self.publish(empty, &edited);
    }

    fn run_transaction<T, E>(
        &mut self,
        change_id: Option<ChangeId>,
        body: impl FnOnce(&mut CacheTransaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        self.last_tx = self.last_tx.next();
        let tx_id = self.last_tx;
        self.context.tracer().transaction_start(tx_id);
        let mut tx = match change_id {
            Some(change_id) => {
                CacheTransaction::optimistic(&self.context, tx_id, &self.snapshot, change_id)
            }
            None => CacheTransaction::new(&self.context, tx_id, &self.snapshot),
        };
        match body(&mut tx) {
            Ok(value) => {
                let outcome = tx.commit();
                self.context
                    .tracer()
                    .transaction_end(tx_id, true, outcome.edited_node_ids.len());
                self.publish(outcome.snapshot, &outcome.edited_node_ids);
                Ok(value)
            }
            Err(err) => {
                tx.discard();
                warn!(tx = %tx_id, "transaction body failed; discarded");
                self.context.tracer().transaction_end(tx_id, false, 0);
                Err(err)
            }
        }
    }

    fn changes_to(&self, next: &CacheSnapshot) -> BTreeSet<NodeId> {
        let mut edited = self.snapshot.baseline().changed_node_ids(next.baseline());
        edited.extend(self.snapshot.optimistic().changed_node_ids(next.optimistic()));
        edited
    }

    fn publish(&mut self, snapshot: CacheSnapshot, edited: &BTreeSet<NodeId>) {
        let previous = std::mem::replace(&mut self.snapshot, snapshot);
        if edited.is_empty() {
            return;
        }
        self.notify_entity_updaters(&previous, edited);
        for observer in self.observers.values_mut() {
            observer.consume_changes(&self.context, &self.snapshot, edited);
        }
    }

    fn notify_entity_updaters(&self, previous: &CacheSnapshot, edited: &BTreeSet<NodeId>) {
        if !self.context.has_entity_updaters() {
            return;
        }
        let before = previous.optimistic();
        let after = self.snapshot.optimistic();
        let typename_field = self.context.config().typename_field.as_str();
        for id in edited {
            let prev = before.get(id);
            let cur = after.get(id);
            if cur
                .or(prev)
                .is_some_and(|n| n.variant() != NodeVariant::Entity)
            {
                continue;
            }
            let typename = cur
                .and_then(|n| n.string_field(typename_field))
                .or_else(|| prev.and_then(|n| n.string_field(typename_field)));
            let Some(typename) = typename else {
                continue;
            };
            let update = EntityUpdate {
                id,
                typename,
                previous: prev.and_then(NodeSnapshot::data),
                current: cur.and_then(NodeSnapshot::data),
                previous_references: prev.map(NodeSnapshot::outbound).unwrap_or_default(),
                current_references: cur.map(NodeSnapshot::outbound).unwrap_or_default(),
            };
            for updater in self.context.entity_updaters(typename) {
                updater(&update);
            }
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheContext::default())
    }
}
