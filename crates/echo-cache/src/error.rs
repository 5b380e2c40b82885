// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types surfaced by cache operations.
use thiserror::Error;

use crate::ident::NodeId;
use crate::path::FieldPath;

/// Errors emitted by writes, restores, and verification.
///
/// Incomplete reads are not errors; see [`crate::ReadResult::complete`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// An object that must be an entity did not yield a usable id.
    #[error("identity error at `{path}`: {reason}")]
    Identity {
        /// Field path (from the selection root) of the offending object.
        path: String,
        /// What was wrong with the id.
        reason: String,
    },
    /// The payload's shape does not match the selection's structure.
    #[error("shape error at `{path}`: expected {expected}, found {found}")]
    Shape {
        /// Field path (from the selection root) of the offending value.
        path: String,
        /// Shape the selection requires.
        expected: &'static str,
        /// Shape found in the payload.
        found: &'static str,
    },
    /// A selected field is absent from the payload (strict mode only).
    #[error("payload is missing selected field `{path}`")]
    MissingField {
        /// Field path (from the selection root) of the missing value.
        path: String,
    },
    /// A verification selection was not fully satisfied after restore/migrate.
    #[error("verification failed: selection rooted at `{root}` is not fully satisfied")]
    Verification {
        /// Root of the verification selection.
        root: NodeId,
    },
    /// The persisted form could not be restored.
    #[error(transparent)]
    Restore(#[from] RestoreError),
    /// Binary codec failure.
    #[error("codec error: {0}")]
    Codec(String),
    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Reasons a persisted cache is rejected by [`crate::restore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    /// The top-level value is not a map of node ids to records.
    #[error("serialized cache must be an object keyed by node id")]
    NotAMap,
    /// A node record is not shaped like `{variant, data, inbound, outbound}`.
    #[error("node `{id}` is malformed: {reason}")]
    MalformedNode {
        /// Offending node.
        id: NodeId,
        /// Description of the problem.
        reason: String,
    },
    /// A node declares a variant this version does not know.
    #[error("node `{id}` has unrecognized variant `{variant}`")]
    UnknownVariant {
        /// Offending node.
        id: NodeId,
        /// The declared variant.
        variant: String,
    },
    /// An outbound edge points at a position its container's data lacks.
    #[error("node `{id}` references `{target}` at `{path}`, which is a hole in its data")]
    UnresolvableReference {
        /// Container node.
        id: NodeId,
        /// Referenced node.
        target: NodeId,
        /// Path of the reference within the container.
        path: FieldPath,
    },
    /// An edge names a node that is not present.
    #[error("node `{id}` has an edge to missing node `{target}`")]
    DanglingEdge {
        /// Node holding the edge.
        id: NodeId,
        /// Missing node.
        target: NodeId,
    },
    /// An edge lacks its mirror on the other node.
    #[error("edge between `{from}` and `{to}` at `{path}` is not mirrored")]
    AsymmetricEdge {
        /// Referencing node.
        from: NodeId,
        /// Referenced node.
        to: NodeId,
        /// Path of the reference within `from`.
        path: FieldPath,
    },
}
