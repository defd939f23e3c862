//! Transaction mempool for RotaChain
//!
//! Pending transactions admitted here wait for inclusion in a block. The
//! pool is transient: it is never persisted and starts empty on every boot.

use crate::error::Result;
use crate::transaction::Transaction;
use std::collections::HashMap;

#[derive(Default)]
pub struct Mempool {
    pending: HashMap<String, PendingEntry>,
    admitted: u64,
}

struct PendingEntry {
    // Admission order, used to keep equal-fee ordering stable.
    seq: u64,
    transaction: Transaction,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a transaction into the pool. Returns Ok(false) without touching
    /// the pool when the id is already pending; any other admission failure
    /// is reported as an error with its reason.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<bool> {
        let id = transaction.id();
        if self.pending.contains_key(&id) {
            return Ok(false);
        }

        transaction.validate_admission()?;

        let seq = self.admitted;
        self.admitted += 1;
        self.pending.insert(id, PendingEntry { seq, transaction });
        Ok(true)
    }

    /// All pending transactions sorted by fee descending. Ties keep admission
    /// order. This is also the block-assembly order used by consensus.
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        let mut entries: Vec<&PendingEntry> = self.pending.values().collect();
        entries.sort_by(|a, b| {
            b.transaction
                .fee()
                .cmp(&a.transaction.fee())
                .then(a.seq.cmp(&b.seq))
        });
        entries
            .into_iter()
            .map(|e| e.transaction.clone())
            .collect()
    }

    /// Removes transactions by id, typically after block inclusion. Unknown
    /// ids are ignored.
    pub fn remove_transactions(&mut self, ids: &[String]) {
        for id in ids {
            self.pending.remove(id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
