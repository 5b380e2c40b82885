// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cache snapshots: the baseline graph, the optimistic view, and the queue
//! that derives one from the other.
use std::rc::Rc;

use crate::graph::GraphSnapshot;
use crate::queue::OptimisticUpdateQueue;

/// Point-in-time state of a cache.
///
/// # Invariants
/// - `optimistic` equals `baseline` with every queued change replayed.
/// - With an empty queue, `optimistic` is the same `Rc` as `baseline`.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    baseline: Rc<GraphSnapshot>,
    optimistic: Rc<GraphSnapshot>,
    optimistic_queue: OptimisticUpdateQueue,
}

impl CacheSnapshot {
    /// Snapshot of `baseline` with no pending optimistic changes.
    #[must_use]
    pub fn new(baseline: Rc<GraphSnapshot>) -> Self {
        Self {
            optimistic: Rc::clone(&baseline),
            baseline,
            optimistic_queue: OptimisticUpdateQueue::new(),
        }
    }

    pub(crate) fn from_parts(
        baseline: Rc<GraphSnapshot>,
        optimistic: Rc<GraphSnapshot>,
        optimistic_queue: OptimisticUpdateQueue,
    ) -> Self {
        if optimistic_queue.is_empty() {
            return Self::new(baseline);
        }
        Self {
            baseline,
            optimistic,
            optimistic_queue,
        }
    }

    /// The graph without optimistic changes.
    #[must_use]
    pub fn baseline(&self) -> &Rc<GraphSnapshot> {
        &self.baseline
    }

    /// The graph with optimistic changes applied.
    #[must_use]
    pub fn optimistic(&self) -> &Rc<GraphSnapshot> {
        &self.optimistic
    }

    /// The optimistic view when `optimistic` is set, else the baseline.
    #[must_use]
    pub fn view(&self, optimistic: bool) -> &Rc<GraphSnapshot> {
        if optimistic {
            &self.optimistic
        } else {
            &self.baseline
        }
    }

    /// Pending optimistic changes.
    #[must_use]
    pub fn optimistic_queue(&self) -> &OptimisticUpdateQueue {
        &self.optimistic_queue
    }
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self::new(Rc::new(GraphSnapshot::new()))
    }
}
