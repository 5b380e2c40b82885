// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Produces the persisted form of a cache snapshot.
use tracing::debug;

use crate::operations::prune::prune;
use crate::selection::Selection;
use crate::serialized::SerializedCache;
use crate::snapshot::CacheSnapshot;

/// Serializes the optimistic view (or the baseline), optionally pruned to
/// what `prune_to` reaches.
pub fn extract(
    snapshot: &CacheSnapshot,
    optimistic: bool,
    prune_to: Option<&Selection>,
) -> SerializedCache {
    let graph = snapshot.view(optimistic);
    let Some(selection) = prune_to else {
        return SerializedCache::from_graph(graph);
    };
    let pruned = prune(graph, selection);
    if !pruned.complete {
        debug!(root = %selection.root_id(), "extracting from an incomplete prune");
    }
    SerializedCache::from_graph(&pruned.snapshot)
}
