// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stateless cache operations over snapshots.
//!
//! Every operation takes its inputs explicitly and returns new values;
//! [`crate::Cache`] composes them with observer delivery and id issuance.

pub mod extract;
pub mod migrate;
pub mod prune;
pub mod read;
pub mod restore;
pub mod write;
