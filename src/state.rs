//! Account ledger for RotaChain
//!
//! Balances and nonces live here. Accounts are created lazily with zero
//! balance on first read and only persisted once a transaction touches them.

use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::storage::Storage;
use crate::transaction::Transaction;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
    pub nonce: u64,
}

impl Account {
    fn empty(address: Address) -> Self {
        Account {
            address,
            balance: 0,
            nonce: 0,
        }
    }
}

pub struct StateManager {
    storage: Arc<dyn Storage>,
    accounts: HashMap<Address, Account>,
}

impl StateManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        StateManager {
            storage,
            accounts: HashMap::new(),
        }
    }

    /// Returns the account for `address`, falling back to a zero-value
    /// default. The default is not persisted.
    pub fn get_account(&self, address: &Address) -> Result<Account> {
        if let Some(account) = self.accounts.get(address) {
            return Ok(account.clone());
        }
        match self.storage.get_account(address) {
            Ok(account) => Ok(account),
            Err(ChainError::NotFound(_)) => Ok(Account::empty(*address)),
            Err(e) => Err(e),
        }
    }

    /// Validates and applies a batch of transactions against a scratch copy
    /// of the touched accounts. Returns the scratch on success; on any
    /// failure nothing is mutated or persisted (all-or-nothing).
    pub fn stage_transactions(
        &self,
        transactions: &[Transaction],
    ) -> Result<HashMap<Address, Account>> {
        let mut staged: HashMap<Address, Account> = HashMap::new();

        for tx in transactions {
            let sender_address = tx.from();
            let mut sender = match staged.get(&sender_address) {
                Some(account) => account.clone(),
                None => self.get_account(&sender_address)?,
            };

            if tx.nonce() != sender.nonce {
                return Err(ChainError::InvalidTransaction(format!(
                    "Nonce mismatch for {}: expected {}, got {}",
                    hex::encode(sender_address),
                    sender.nonce,
                    tx.nonce()
                )));
            }

            // Every transaction type pays its fee; Transfer and Stake also
            // move their amount.
            let cost = tx.amount().checked_add(tx.fee()).ok_or_else(|| {
                ChainError::InvalidTransaction("Amount plus fee overflows".to_string())
            })?;

            if sender.balance < cost {
                return Err(ChainError::InvalidTransaction(format!(
                    "Insufficient funds for {}: balance {}, cost {}",
                    hex::encode(sender_address),
                    sender.balance,
                    cost
                )));
            }

            sender.balance -= cost;
            sender.nonce += 1;
            staged.insert(sender_address, sender);

            if let Transaction::Transfer(transfer) = tx {
                let mut recipient = match staged.get(&transfer.to) {
                    Some(account) => account.clone(),
                    None => self.get_account(&transfer.to)?,
                };
                recipient.balance = recipient.balance.checked_add(transfer.amount).ok_or_else(
                    || ChainError::InvalidTransaction("Recipient balance overflows".to_string()),
                )?;
                staged.insert(transfer.to, recipient);
            }
        }

        Ok(staged)
    }

    /// Folds a staged account set into the in-memory ledger. Callers persist
    /// the same set through `Storage` as part of their own atomic commit.
    pub fn commit(&mut self, staged: HashMap<Address, Account>) {
        for (address, account) in staged {
            self.accounts.insert(address, account);
        }
    }

    /// Applies a single transaction and persists the touched accounts
    /// atomically. Block application goes through `stage_transactions` +
    /// `commit` instead so persistence joins the block's own commit.
    pub fn apply_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        let staged = self.stage_transactions(std::slice::from_ref(transaction))?;
        let accounts: Vec<Account> = staged.values().cloned().collect();
        self.storage.batch_update_accounts(&accounts)?;
        self.commit(staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_string, KeyPair};
    use crate::storage::InMemoryStorage;
    use crate::transaction::{StakeTx, TransferTx};

    fn manager_with_balance(address: Address, balance: u64) -> StateManager {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .save_account(&Account {
                address,
                balance,
                nonce: 0,
            })
            .unwrap();
        StateManager::new(storage)
    }

    fn transfer(from: Address, to: Address, amount: u64, fee: u64, nonce: u64) -> Transaction {
        Transaction::Transfer(TransferTx::new(from, to, amount, fee, nonce))
    }

    #[test]
    fn test_unknown_account_defaults_to_zero() {
        let manager = StateManager::new(Arc::new(InMemoryStorage::new()));
        let account = manager.get_account(&address_from_string("nobody")).unwrap();
        assert_eq!(account.balance, 0);
        assert_eq!(account.nonce, 0);
    }

    #[test]
    fn test_transfer_debits_fee_and_increments_nonce() {
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        let mut manager = manager_with_balance(alice, 1000);

        manager
            .apply_transaction(&transfer(alice, bob, 100, 10, 0))
            .unwrap();

        let sender = manager.get_account(&alice).unwrap();
        assert_eq!(sender.balance, 890);
        assert_eq!(sender.nonce, 1);

        let recipient = manager.get_account(&bob).unwrap();
        assert_eq!(recipient.balance, 100);
        assert_eq!(recipient.nonce, 0);
    }

    #[test]
    fn test_nonce_replay_rejected_without_mutation() {
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        let mut manager = manager_with_balance(alice, 1000);

        manager
            .apply_transaction(&transfer(alice, bob, 100, 10, 0))
            .unwrap();

        // Reusing nonce 0 must fail and leave both accounts untouched.
        let result = manager.apply_transaction(&transfer(alice, bob, 50, 1, 0));
        assert!(matches!(result, Err(ChainError::InvalidTransaction(_))));

        let sender = manager.get_account(&alice).unwrap();
        assert_eq!(sender.balance, 890);
        assert_eq!(sender.nonce, 1);
        assert_eq!(manager.get_account(&bob).unwrap().balance, 100);
    }

    #[test]
    fn test_insufficient_funds_is_all_or_nothing() {
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        let mut manager = manager_with_balance(alice, 50);

        let result = manager.apply_transaction(&transfer(alice, bob, 100, 10, 0));
        assert!(matches!(result, Err(ChainError::InvalidTransaction(_))));

        let sender = manager.get_account(&alice).unwrap();
        assert_eq!(sender.balance, 50);
        assert_eq!(sender.nonce, 0);
        assert_eq!(manager.get_account(&bob).unwrap().balance, 0);
    }

    #[test]
    fn test_stake_locks_amount_plus_fee() {
        let alice = address_from_string("alice");
        let mut manager = manager_with_balance(alice, 500);
        let validator = KeyPair::generate().unwrap().validator_id();

        let stake = Transaction::Stake(StakeTx::new(alice, validator, 200, 5, 0));
        manager.apply_transaction(&stake).unwrap();

        let account = manager.get_account(&alice).unwrap();
        assert_eq!(account.balance, 295);
        assert_eq!(account.nonce, 1);
    }

    #[test]
    fn test_batch_failure_rolls_back_earlier_transactions() {
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        let manager = manager_with_balance(alice, 100);

        // First transfer is fine; the second exceeds the remaining balance,
        // so the whole batch must fail with no staged result.
        let batch = vec![
            transfer(alice, bob, 50, 0, 0),
            transfer(alice, bob, 100, 0, 1),
        ];
        assert!(manager.stage_transactions(&batch).is_err());

        assert_eq!(manager.get_account(&alice).unwrap().balance, 100);
        assert_eq!(manager.get_account(&bob).unwrap().balance, 0);
    }

    #[test]
    fn test_sequential_nonces_within_batch() {
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        let manager = manager_with_balance(alice, 100);

        let batch = vec![
            transfer(alice, bob, 10, 0, 0),
            transfer(alice, bob, 10, 0, 1),
        ];
        let staged = manager.stage_transactions(&batch).unwrap();
        assert_eq!(staged.get(&alice).unwrap().nonce, 2);
        assert_eq!(staged.get(&alice).unwrap().balance, 80);
        assert_eq!(staged.get(&bob).unwrap().balance, 20);
    }
}
