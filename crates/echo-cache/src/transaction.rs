// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cache transactions.
//!
//! A transaction batches writes and rollbacks against one [`CacheSnapshot`]
//! and yields a new snapshot on [`CacheTransaction::commit`]. Its lifecycle
//! (`Open -> Committed | Discarded`) is carried by ownership: `commit` and
//! `discard` consume the transaction, and dropping it discards.
//!
//! A transaction opened with a [`ChangeId`] is optimistic: its writes update
//! the optimistic view only and are queued under the change id on commit.
//! Other transactions write the baseline, after which the optimistic view is
//! rebuilt by replaying the queue.
use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::context::CacheContext;
use crate::editor::SnapshotEditor;
use crate::error::CacheError;
use crate::graph::GraphSnapshot;
use crate::ident::NodeId;
use crate::operations::read::{read, ReadResult};
use crate::queue::{OptimisticDelta, OptimisticUpdateQueue};
use crate::selection::Selection;
use crate::snapshot::CacheSnapshot;
use crate::tx::{ChangeId, TxId};

/// What a committed transaction produced.
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    /// Transaction that produced this outcome.
    pub tx: TxId,
    /// The new cache snapshot.
    pub snapshot: CacheSnapshot,
    /// Nodes added, changed, or removed in either view.
    pub edited_node_ids: BTreeSet<NodeId>,
    /// Selections written, in order.
    pub written_selections: Vec<Selection>,
}

/// An open transaction over a [`CacheSnapshot`].
#[derive(Debug)]
pub struct CacheTransaction<'a> {
    context: &'a CacheContext,
    tx: TxId,
    change_id: Option<ChangeId>,
    baseline: Rc<GraphSnapshot>,
    optimistic: Rc<GraphSnapshot>,
    queue: OptimisticUpdateQueue,
    deltas: Vec<OptimisticDelta>,
    edited: BTreeSet<NodeId>,
    written: Vec<Selection>,
}

impl<'a> CacheTransaction<'a> {
    /// Opens a transaction that writes the baseline.
    pub fn new(context: &'a CacheContext, tx: TxId, snapshot: &CacheSnapshot) -> Self {
        Self {
            context,
            tx,
            change_id: None,
            baseline: Rc::clone(snapshot.baseline()),
            optimistic: Rc::clone(snapshot.optimistic()),
            queue: snapshot.optimistic_queue().clone(),
            deltas: Vec::new(),
            edited: BTreeSet::new(),
            written: Vec::new(),
        }
    }

    /// Opens an optimistic transaction whose writes are queued under
    /// `change_id`.
    pub fn optimistic(
        context: &'a CacheContext,
        tx: TxId,
        snapshot: &CacheSnapshot,
        change_id: ChangeId,
    ) -> Self {
        Self {
            change_id: Some(change_id),
            ..Self::new(context, tx, snapshot)
        }
    }

    /// This transaction's id.
    pub fn id(&self) -> TxId {
        self.tx
    }

    /// The change id of an optimistic transaction.
    pub fn change_id(&self) -> Option<&ChangeId> {
        self.change_id.as_ref()
    }

    /// Nodes edited so far.
    pub fn edited_node_ids(&self) -> &BTreeSet<NodeId> {
        &self.edited
    }

    /// Writes `payload` along `selection`.
    ///
    /// Returns the nodes this write edited. A failed write leaves the
    /// transaction as it was before the call.
    pub fn write(
        &mut self,
        selection: &Selection,
        payload: &Value,
    ) -> Result<BTreeSet<NodeId>, CacheError> {
        let edited = if self.change_id.is_some() {
            let mut editor = SnapshotEditor::new(self.context, &self.optimistic);
            editor.merge(selection, payload)?;
            let commit = editor.commit();
            self.optimistic = commit.snapshot;
            self.deltas.push(OptimisticDelta {
                selection: selection.clone(),
                payload: payload.clone(),
            });
            commit.edited_node_ids
        } else {
            let mut editor = SnapshotEditor::new(self.context, &self.baseline);
            editor.merge(selection, payload)?;
            let commit = editor.commit();
            let mut edited = commit.edited_node_ids;
            let optimistic = if self.queue.is_empty() {
                Rc::clone(&commit.snapshot)
            } else {
                let rebuilt = self.replay(&commit.snapshot, &self.queue)?;
                edited.extend(self.optimistic.changed_node_ids(&rebuilt));
                rebuilt
            };
            self.baseline = commit.snapshot;
            self.optimistic = optimistic;
            edited
        };
        self.context.tracer().write_end(selection, edited.len());
        self.edited.extend(edited.iter().cloned());
        self.written.push(selection.clone());
        Ok(edited)
    }

    /// Removes every queued write recorded under `change_id` and rebuilds
    /// the optimistic view without them.
    ///
    /// Returns the nodes whose optimistic state changed.
    pub fn rollback(&mut self, change_id: &ChangeId) -> Result<BTreeSet<NodeId>, CacheError> {
        if !self.queue.contains(change_id) {
            debug!(tx = %self.tx, change = %change_id, "rollback of unknown change ignored");
            return Ok(BTreeSet::new());
        }
        let queue = self.queue.remove(change_id);
        let rebuilt = self.replay(&self.baseline, &queue)?;
        let edited = self.optimistic.changed_node_ids(&rebuilt);
        self.queue = queue;
        self.optimistic = rebuilt;
        self.edited.extend(edited.iter().cloned());
        Ok(edited)
    }

    /// Reads `selection` from the transaction's current state.
    pub fn read(&self, selection: &Selection, optimistic: bool) -> Rc<ReadResult> {
        let graph = if optimistic {
            &self.optimistic
        } else {
            &self.baseline
        };
        read(self.context, selection, graph)
    }

    /// Publishes the transaction's state as a new snapshot.
    pub fn commit(self) -> TransactionOutcome {
        let queue = match self.change_id {
            Some(change_id) if !self.deltas.is_empty() => self.queue.enqueue(change_id, self.deltas),
            _ => self.queue,
        };
        let snapshot = CacheSnapshot::from_parts(self.baseline, self.optimistic, queue);
        debug!(
            tx = %self.tx,
            edited = self.edited.len(),
            queued = snapshot.optimistic_queue().len(),
            "transaction committed"
        );
        TransactionOutcome {
            tx: self.tx,
            snapshot,
            edited_node_ids: self.edited,
            written_selections: self.written,
        }
    }

    /// Drops every write made in the transaction.
    pub fn discard(self) {
        debug!(tx = %self.tx, edited = self.edited.len(), "transaction discarded");
    }

    /// Replays `queue`, then this transaction's own deltas, over `baseline`.
    fn replay(
        &self,
        baseline: &Rc<GraphSnapshot>,
        queue: &OptimisticUpdateQueue,
    ) -> Result<Rc<GraphSnapshot>, CacheError> {
        if queue.is_empty() && self.deltas.is_empty() {
            return Ok(Rc::clone(baseline));
        }
        let mut editor = SnapshotEditor::new(self.context, baseline);
        for delta in queue.iter().flat_map(|c| &c.deltas).chain(&self.deltas) {
            editor.merge(&delta.selection, &delta.payload)?;
        }
        Ok(editor.commit().snapshot)
    }
}
