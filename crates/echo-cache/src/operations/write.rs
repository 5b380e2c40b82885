// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Single-write convenience over [`CacheTransaction`].
use serde_json::Value;

use crate::context::CacheContext;
use crate::error::CacheError;
use crate::selection::Selection;
use crate::snapshot::CacheSnapshot;
use crate::transaction::{CacheTransaction, TransactionOutcome};
use crate::tx::{ChangeId, TxId};

/// Writes one payload in its own transaction and commits it.
///
/// With a `change_id` the write is optimistic and queued under that id.
pub fn write(
    context: &CacheContext,
    snapshot: &CacheSnapshot,
    tx: TxId,
    selection: &Selection,
    payload: &Value,
    change_id: Option<ChangeId>,
) -> Result<TransactionOutcome, CacheError> {
    let mut transaction = match change_id {
        Some(change_id) => CacheTransaction::optimistic(context, tx, snapshot, change_id),
        None => CacheTransaction::new(context, tx, snapshot),
    };
    transaction.write(selection, payload)?;
    Ok(transaction.commit())
}
