//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Built-in commit plugins. External plugin loading from shared objects is
//! out of scope; this is the one plugin registered by default, always
//! present before any optional plugin is configured.

use ncd_txn::{CommitPlugin, Transaction};
use tracing::debug;

/// Traces every phase of every commit at debug level. Registered first so
/// its `begin`/`validate`/`complete` run before any future plugin's, and
/// (being first) its `abort`/`revert` run last, bracketing the others in
/// the log.
pub struct AuditPlugin;

impl CommitPlugin for AuditPlugin {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn begin(&mut self, txn: &mut Transaction) -> Result<(), String> {
        debug!(transaction_id = txn.id, "commit begin");
        Ok(())
    }

    fn validate(&mut self, txn: &mut Transaction) -> Result<(), String> {
        debug!(
            transaction_id = txn.id,
            deleted = txn.delta.deleted.len(),
            added = txn.delta.added.len(),
            changed = txn.delta.changed_src.len(),
            "commit validate"
        );
        Ok(())
    }

    fn commit(&mut self, txn: &mut Transaction) -> Result<(), String> {
        debug!(transaction_id = txn.id, "commit apply");
        Ok(())
    }

    fn commit_done(&mut self, txn: &mut Transaction) {
        debug!(transaction_id = txn.id, "commit done");
    }

    fn revert(&mut self, txn: &mut Transaction) {
        debug!(transaction_id = txn.id, "commit revert");
    }

    fn abort(&mut self, txn: &mut Transaction) {
        debug!(transaction_id = txn.id, "commit abort");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncd_tree::Tree;
    use ncd_txn::Delta;

    #[test]
    fn phases_never_fail() {
        let mut plugin = AuditPlugin;
        let mut txn = Transaction {
            id: 1,
            src: Tree::new(),
            target: Tree::new(),
            delta: Delta::default(),
            arg: None,
        };
        assert!(plugin.begin(&mut txn).is_ok());
        assert!(plugin.validate(&mut txn).is_ok());
        assert!(plugin.commit(&mut txn).is_ok());
        plugin.commit_done(&mut txn);
        plugin.revert(&mut txn);
        plugin.abort(&mut txn);
    }
}
