//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Rollback log: a record of each successful commit's pre-change `running`
//! content, persisted to the non-volatile `PickleDb` so a restart can still
//! answer "what did running look like before transaction N". The commit
//! engine's own `Transaction` isn't itself serializable (it holds a `Tree`
//! and an opaque plugin argument slot), so this keeps its own lightweight
//! record shape instead.

use pickledb::PickleDb;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Clone, Deserialize, Serialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub running_before: String,
    pub running_after: String,
}

/// Records a transaction in the rollback log, assigning it the next id.
pub(crate) fn transaction_record(db: &mut PickleDb, mut record: TransactionRecord) -> u64 {
    record.id = transaction_next_key(db);
    let key = format!("transaction{}", record.id);
    if let Err(error) = db.set(&key, &record) {
        error!(%error, "failed to record transaction in the rollback log");
    }
    record.id
}

/// Retrieves a transaction from the rollback log, identified by its ID.
#[allow(dead_code)]
pub(crate) fn transaction_get(db: &PickleDb, transaction_id: u64) -> Option<TransactionRecord> {
    let key = format!("transaction{transaction_id}");
    db.get(&key)
}

/// Retrieves all transactions from the rollback log.
#[allow(dead_code)]
pub(crate) fn transaction_get_all(db: &PickleDb) -> Vec<TransactionRecord> {
    db.iter()
        .filter(|entry| entry.get_key().starts_with("transaction"))
        .filter_map(|entry| entry.get_value::<TransactionRecord>())
        .collect()
}

/// Retrieves the next available transaction ID and updates it.
fn transaction_next_key(db: &mut PickleDb) -> u64 {
    let mut next_id: u64 = db.get("next_id").unwrap_or(0);
    next_id += 1;
    if let Err(error) = db.set("next_id", &next_id) {
        error!(%error, "failed to update the next transaction ID in the rollback log");
    }
    next_id
}
