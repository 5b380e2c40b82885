// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Query observers: re-deliver a selection's result when the nodes it depends
//! on change.
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::context::CacheContext;
use crate::ident::NodeId;
use crate::operations::read::{read, ReadResult};
use crate::selection::Selection;
use crate::snapshot::CacheSnapshot;

/// Handle of a registered observer, issued by [`crate::Cache::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub(crate) const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Callback receiving each new result.
pub type ObserverCallback = Box<dyn FnMut(&ReadResult)>;

/// Watches one selection against successive cache snapshots.
pub struct QueryObserver {
    selection: Selection,
    optimistic: bool,
    last: Option<Rc<ReadResult>>,
    callback: ObserverCallback,
}

impl QueryObserver {
    /// Observer of `selection` on the optimistic view (`optimistic == true`)
    /// or the baseline.
    pub fn new(
        selection: Selection,
        optimistic: bool,
        callback: impl FnMut(&ReadResult) + 'static,
    ) -> Self {
        Self {
            selection,
            optimistic,
            last: None,
            callback: Box::new(callback),
        }
    }

    /// The observed selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The last result read, delivered or not.
    pub fn last_result(&self) -> Option<&ReadResult> {
        self.last.as_deref()
    }

    /// Records the current result without calling back.
    pub fn prime(&mut self, context: &CacheContext, snapshot: &CacheSnapshot) {
        self.last = Some(read(context, &self.selection, snapshot.view(self.optimistic)));
    }

    /// Reacts to a committed change.
    ///
    /// Re-reads only when `edited` intersects the last result's touched set
    /// (or nothing has been read yet), and calls back only when the result
    /// or its completeness differs from the last one. Returns `true` if the
    /// callback ran.
    pub fn consume_changes(
        &mut self,
        context: &CacheContext,
        snapshot: &CacheSnapshot,
        edited: &BTreeSet<NodeId>,
    ) -> bool {
        if self
            .last
            .as_ref()
            .is_some_and(|last| last.touched_node_ids.is_disjoint(edited))
        {
            return false;
        }
        let current = read(context, &self.selection, snapshot.view(self.optimistic));
        let unchanged = self.last.as_ref().is_some_and(|last| {
            Rc::ptr_eq(last, &current)
                || (last.result == current.result && last.complete == current.complete)
        });
        self.last = Some(Rc::clone(&current));
        if unchanged {
            return false;
        }
        (self.callback)(&current);
        true
    }
}

impl fmt::Debug for QueryObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver")
            .field("root", self.selection.root_id())
            .field("optimistic", &self.optimistic)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
