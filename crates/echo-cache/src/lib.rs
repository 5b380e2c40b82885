// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! echo-cache: normalized, snapshot-versioned graph cache for query-shaped
//! data.
//!
//! Callers write JSON payloads along a [`Selection`]; the cache stores them as
//! a graph of identity-addressed nodes and reassembles results on read.
//! Every committed transaction produces a new immutable [`CacheSnapshot`]
//! that shares unchanged nodes with its predecessor. Optimistic writes are
//! queued by [`ChangeId`] and can be rolled back by replaying the remaining
//! queue over the baseline.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod cache;
mod context;
mod editor;
mod error;
mod graph;
mod ident;
mod node;
mod observer;
/// Stateless operations over snapshots (read, write, restore, extract,
/// prune, migrate).
pub mod operations;
mod path;
mod queue;
mod selection;
mod serialized;
mod snapshot;
mod transaction;
mod tx;

/// Cache facade owning the current snapshot and observers.
pub use cache::Cache;
/// Settings and host-supplied collaborators.
pub use context::{
    CacheConfig, CacheContext, CacheTracer, DefaultEntityIds, EntityIdResolver, EntityUpdate,
    EntityUpdater, NoopTracer,
};
/// Payload normalization into derived snapshots.
pub use editor::{EditorCommit, SnapshotEditor};
/// Error types.
pub use error::{CacheError, RestoreError};
/// Immutable node arena and its digest type.
pub use graph::{GraphSnapshot, Hash};
/// Node identifiers and argument canonicalization.
pub use ident::{canonicalize, NodeId, MUTATION_ROOT, PARAMETERIZED_ID_SEPARATOR, QUERY_ROOT};
/// Node records.
pub use node::{NodeParts, NodeSnapshot, NodeVariant};
/// Result observers.
pub use observer::{ObserverCallback, ObserverId, QueryObserver};
/// Migration instructions.
pub use operations::migrate::{FieldTransform, MigrationMap, ParameterizedTransform, QUERY_TYPENAME};
/// Prune results.
pub use operations::prune::PruneResult;
/// Read results.
pub use operations::read::ReadResult;
/// Restore entry point and result.
pub use operations::restore::{restore, RestoreOutcome};
/// Paths and edge records.
pub use path::{FieldPath, NodeReference, PathPart};
/// Optimistic update queue.
pub use queue::{OptimisticChange, OptimisticDelta, OptimisticUpdateQueue};
/// Selection trees.
pub use selection::{ArgumentValue, FieldDirective, Selection, SelectionField, SelectionSet};
/// Persisted format.
pub use serialized::{SerializedCache, SerializedNode};
/// Baseline plus optimistic view.
pub use snapshot::CacheSnapshot;
/// Transactions.
pub use transaction::{CacheTransaction, TransactionOutcome};
/// Transaction and change identifiers.
pub use tx::{ChangeId, TxId};
