// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Transaction and optimistic change identifier types.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Thin wrapper around a transaction identifier.
///
/// [`crate::Cache`] issues monotonically increasing identifiers for every
/// transaction it opens; they appear in tracing spans and in
/// [`crate::TransactionOutcome`].
///
/// # Invariants
/// - Zero (`TxId(0)`) is reserved; the cache never issues it.
/// - The counter wraps at `u64::MAX` and resumes at `1`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TxId(u64);

impl TxId {
    /// Constructs a `TxId` from a raw `u64` value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the identifier following `self`, skipping zero on wrap.
    #[must_use]
    pub(crate) const fn next(self) -> Self {
        let next = self.0.wrapping_add(1);
        if next == 0 {
            Self(1)
        } else {
            Self(next)
        }
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-chosen identifier of one optimistic change.
///
/// Every write of an optimistic transaction is queued under its change id;
/// [`crate::Cache::rollback`] removes all of them at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Wraps a caller-supplied id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
