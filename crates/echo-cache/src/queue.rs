// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Optimistic update queue: ordered, immutable list of pending changes.
use std::rc::Rc;

use serde_json::Value;

use crate::context::CacheContext;
use crate::editor::{EditorCommit, SnapshotEditor};
use crate::error::CacheError;
use crate::graph::GraphSnapshot;
use crate::selection::Selection;
use crate::tx::ChangeId;

/// One optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticDelta {
    /// Selection the payload was written with.
    pub selection: Selection,
    /// Payload as written.
    pub payload: Value,
}

/// All writes made under one change id.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticChange {
    /// Identifier used to roll the change back.
    pub change_id: ChangeId,
    /// Writes, in order.
    pub deltas: Vec<OptimisticDelta>,
}

/// Pending optimistic changes, oldest first.
///
/// Queues are values: [`OptimisticUpdateQueue::enqueue`] and
/// [`OptimisticUpdateQueue::remove`] return new queues and share the
/// unchanged entries with the original.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimisticUpdateQueue {
    changes: Vec<Rc<OptimisticChange>>,
}

impl OptimisticUpdateQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a queue with `deltas` appended under `change_id`.
    #[must_use]
    pub fn enqueue(&self, change_id: ChangeId, deltas: Vec<OptimisticDelta>) -> Self {
        let mut changes = self.changes.clone();
        changes.push(Rc::new(OptimisticChange { change_id, deltas }));
        Self { changes }
    }

    /// Returns a queue without any change recorded under `change_id`.
    #[must_use]
    pub fn remove(&self, change_id: &ChangeId) -> Self {
        Self {
            changes: self
                .changes
                .iter()
                .filter(|c| c.change_id != *change_id)
                .cloned()
                .collect(),
        }
    }

    /// Returns `true` if a change is queued under `change_id`.
    #[must_use]
    pub fn contains(&self, change_id: &ChangeId) -> bool {
        self.changes.iter().any(|c| c.change_id == *change_id)
    }

    /// Queued changes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &OptimisticChange> {
        self.changes.iter().map(AsRef::as_ref)
    }

    /// Number of queued changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Replays every queued delta over `baseline` in one editor.
    ///
    /// An empty queue returns `baseline` itself with no edits.
    pub fn apply(
        &self,
        context: &CacheContext,
        baseline: &Rc<GraphSnapshot>,
    ) -> Result<EditorCommit, CacheError> {
        let mut editor = SnapshotEditor::new(context, baseline);
        for delta in self.iter().flat_map(|c| &c.deltas) {
            editor.merge(&delta.selection, &delta.payload)?;
        }
        Ok(editor.commit())
    }
}
