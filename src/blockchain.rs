//! Blockchain core: block structure, genesis, and chain extension
//!
//! `Blockchain` is the replicated state machine. A block is accepted only if
//! it extends the tip, its content hash checks out, its producer's signature
//! verifies, and every transaction applies cleanly to the ledger; acceptance
//! persists the block and the touched accounts in one commit.

use crate::contracts::ContractEngine;
use crate::crypto::{self, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::governance::GovernanceModule;
use crate::mempool::Mempool;
use crate::staking::StakingManager;
use crate::state::StateManager;
use crate::storage::Storage;
use crate::transaction::Transaction;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed genesis timestamp: 2024-01-01T00:00:00Z in milliseconds.
const GENESIS_TIMESTAMP: u64 = 1_704_067_200_000;

/// Sentinel producer identity carried by the genesis block. Height 0 is
/// never signature-checked, so the sentinel never reaches verification.
const GENESIS_VALIDATOR: &str = "genesis";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: Sha256Hash,
    pub hash: Sha256Hash,
    /// Hex-encoded compressed public key of the producing validator.
    pub validator: String,
    /// Compact ECDSA signature by `validator` over `hash`.
    pub signature: Vec<u8>,
    pub total_fees: u64,
}

impl Block {
    /// Content hash over height, timestamp, transactions, previous hash, and
    /// total fees. The producer's identity and signature are not part of the
    /// content; the signature covers this hash instead.
    pub fn compute_hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        for tx in &self.transactions {
            hasher.update(tx.hash());
        }
        hasher.update(self.previous_hash);
        hasher.update(self.total_fees.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn genesis() -> Block {
        let mut block = Block {
            height: 0,
            timestamp: GENESIS_TIMESTAMP,
            transactions: Vec::new(),
            previous_hash: [0u8; 32],
            hash: [0u8; 32],
            validator: GENESIS_VALIDATOR.to_string(),
            signature: Vec::new(),
            total_fees: 0,
        };
        block.hash = block.compute_hash();
        block
    }
}

pub struct Blockchain {
    storage: Arc<dyn Storage>,
    pub state: StateManager,
    pub staking: StakingManager,
    pub governance: GovernanceModule,
    pub contracts: ContractEngine,
    tip: Block,
}

impl Blockchain {
    /// Loads the persisted tip, creating and persisting genesis when the
    /// store is empty, then rebuilds the in-memory validator roster and
    /// governance state by replaying stored blocks.
    pub fn new(
        storage: Arc<dyn Storage>,
        state: StateManager,
        staking: StakingManager,
        governance: GovernanceModule,
        contracts: ContractEngine,
    ) -> Result<Self> {
        let tip = match storage.get_latest_block() {
            Ok(block) => block,
            Err(ChainError::NotFound(_)) => {
                let genesis = Block::genesis();
                storage.save_block(&genesis)?;
                genesis
            }
            Err(e) => return Err(e),
        };

        let mut chain = Blockchain {
            storage,
            state,
            staking,
            governance,
            contracts,
            tip,
        };
        chain.replay_stored_blocks()?;
        Ok(chain)
    }

    /// Rebuilds process-lifetime caches (validator roster, proposals) from
    /// stored blocks. The ledger and contract state are durable already, so
    /// only Stake and governance transactions are re-dispatched.
    fn replay_stored_blocks(&mut self) -> Result<()> {
        for height in 1..=self.tip.height {
            let block = self.storage.get_block(height)?;
            self.governance.tally_votes(block.height);
            for tx in &block.transactions {
                match tx {
                    Transaction::Stake(stake) => {
                        self.staking.process_stake(&stake.validator, stake.amount);
                    }
                    Transaction::GovernanceProposal(proposal) => {
                        self.governance.submit_proposal(proposal, block.height);
                    }
                    Transaction::GovernanceVote(vote) => {
                        if let Err(e) = self.governance.cast_vote(vote) {
                            debug!("Skipping stored vote during replay: {}", e);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub fn latest_block(&self) -> &Block {
        &self.tip
    }

    pub fn get_block(&self, height: u64) -> Result<Block> {
        self.storage.get_block(height)
    }

    /// Up to `n` blocks descending from the tip, clipped at genesis.
    pub fn latest_blocks(&self, n: usize) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut height = self.tip.height;
        for _ in 0..n {
            blocks.push(self.storage.get_block(height)?);
            if height == 0 {
                break;
            }
            height -= 1;
        }
        Ok(blocks)
    }

    /// Validates and appends a block, applying its ledger transitions as one
    /// atomic step. Any check failure leaves tip, ledger, and storage
    /// untouched; racing producers losing the height check is the expected
    /// steady state, not an error.
    pub fn apply_block(&mut self, block: &Block, mempool: &mut Mempool) -> Result<()> {
        if block.height != self.tip.height + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid height. Expected {}, but got {}.",
                self.tip.height + 1,
                block.height
            )));
        }

        if block.previous_hash != self.tip.hash {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid previous hash. Expected {}, but got {}.",
                hex::encode(self.tip.hash),
                hex::encode(block.previous_hash)
            )));
        }

        if block.compute_hash() != block.hash {
            return Err(ChainError::InvalidBlock(
                "Content hash mismatch".to_string(),
            ));
        }

        crypto::verify_signature_hex(&block.validator, &block.hash, &block.signature).map_err(
            |e| ChainError::InvalidBlock(format!("Invalid validator signature: {}", e)),
        )?;

        // Ledger application is part of the same transition: every
        // transaction must apply, or the whole block is rejected.
        let staged = self.state.stage_transactions(&block.transactions)?;
        let accounts: Vec<_> = staged.values().cloned().collect();
        self.storage.commit_block(block, &accounts)?;
        self.state.commit(staged);

        // Proposals close before this block's transactions are considered,
        // so a vote can never be tallied in the height that cast it.
        self.governance.tally_votes(block.height);
        for tx in &block.transactions {
            self.dispatch_transaction(tx, block.height);
        }

        self.tip = block.clone();

        let included: Vec<String> = block.transactions.iter().map(|tx| tx.id()).collect();
        mempool.remove_transactions(&included);

        Ok(())
    }

    /// Type-specific side effects of an applied transaction. The ledger part
    /// already succeeded; failures here are per-transaction outcomes (a vote
    /// on a closed proposal, a call to a missing contract) and never unwind
    /// the block.
    fn dispatch_transaction(&mut self, tx: &Transaction, height: u64) {
        match tx {
            Transaction::Transfer(_) => {}
            Transaction::Stake(stake) => {
                self.staking.process_stake(&stake.validator, stake.amount);
            }
            Transaction::GovernanceProposal(proposal) => {
                let id = self.governance.submit_proposal(proposal, height);
                debug!("Proposal {} submitted at height {}", id, height);
            }
            Transaction::GovernanceVote(vote) => {
                if let Err(e) = self.governance.cast_vote(vote) {
                    warn!("Vote in block {} not counted: {}", height, e);
                }
            }
            Transaction::ContractCreation(creation) => match self.contracts.deploy_contract(creation) {
                Ok(id) => debug!("Contract {} deployed at height {}", id, height),
                Err(e) => warn!("Contract deployment in block {} failed: {}", height, e),
            },
            Transaction::ContractCall(call) => {
                if let Err(e) = self.contracts.execute_contract(call) {
                    warn!("Contract call in block {} failed: {}", height, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_string, KeyPair};
    use crate::state::Account;
    use crate::storage::InMemoryStorage;
    use crate::transaction::TransferTx;

    fn new_chain(storage: Arc<dyn Storage>) -> Blockchain {
        Blockchain::new(
            storage.clone(),
            StateManager::new(storage.clone()),
            StakingManager::new(),
            GovernanceModule::new(),
            ContractEngine::new(storage),
        )
        .unwrap()
    }

    fn build_block(chain: &Blockchain, transactions: Vec<Transaction>, producer: &KeyPair) -> Block {
        let tip = chain.latest_block();
        let total_fees = transactions.iter().map(|tx| tx.fee()).sum();
        let mut block = Block {
            height: tip.height + 1,
            timestamp: tip.timestamp + 1000,
            transactions,
            previous_hash: tip.hash,
            hash: [0u8; 32],
            validator: producer.validator_id(),
            signature: Vec::new(),
            total_fees,
        };
        block.hash = block.compute_hash();
        block.signature = producer.sign(&block.hash).unwrap().to_vec();
        block
    }

    fn signed_transfer(keypair: &KeyPair, to: &str, amount: u64, fee: u64, nonce: u64) -> Transaction {
        let mut tx = TransferTx::new(keypair.address(), address_from_string(to), amount, fee, nonce);
        let message = tx.signable_message();
        let signature = keypair.sign(&message).unwrap();
        tx.sign(signature.to_vec(), keypair.public_key_bytes().to_vec());
        Transaction::Transfer(tx)
    }

    #[test]
    fn test_genesis_invariants() {
        let chain = new_chain(Arc::new(InMemoryStorage::new()));
        let genesis = chain.latest_block();
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.previous_hash, [0u8; 32]);
        assert_eq!(genesis.total_fees, 0);
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.hash, genesis.compute_hash());
    }

    #[test]
    fn test_genesis_is_persisted_once() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let first_hash = {
            let chain = new_chain(storage.clone());
            chain.latest_block().hash
        };

        // Re-opening the same storage must load the existing genesis.
        let chain = new_chain(storage);
        assert_eq!(chain.latest_block().hash, first_hash);
    }

    #[test]
    fn test_first_block_extends_genesis() {
        let mut chain = new_chain(Arc::new(InMemoryStorage::new()));
        let producer = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();

        let genesis_hash = chain.latest_block().hash;
        let block = build_block(&chain, vec![], &producer);
        chain.apply_block(&block, &mut mempool).unwrap();

        let tip = chain.latest_block();
        assert_eq!(tip.height, 1);
        assert_eq!(tip.previous_hash, genesis_hash);
    }

    #[test]
    fn test_each_corrupted_field_rejected_and_tip_unchanged() {
        let mut chain = new_chain(Arc::new(InMemoryStorage::new()));
        let producer = KeyPair::generate().unwrap();
        let outsider = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();

        let valid = build_block(&chain, vec![], &producer);
        let tip_hash = chain.latest_block().hash;

        let mut wrong_height = valid.clone();
        wrong_height.height = 5;
        assert!(chain.apply_block(&wrong_height, &mut mempool).is_err());

        let mut wrong_previous = valid.clone();
        wrong_previous.previous_hash = [7u8; 32];
        assert!(chain.apply_block(&wrong_previous, &mut mempool).is_err());

        let mut wrong_hash = valid.clone();
        wrong_hash.hash = [7u8; 32];
        assert!(chain.apply_block(&wrong_hash, &mut mempool).is_err());

        let mut wrong_signer = valid.clone();
        wrong_signer.signature = outsider.sign(&wrong_signer.hash).unwrap().to_vec();
        assert!(chain.apply_block(&wrong_signer, &mut mempool).is_err());

        assert_eq!(chain.latest_block().height, 0);
        assert_eq!(chain.latest_block().hash, tip_hash);

        // The untampered block still applies.
        assert!(chain.apply_block(&valid, &mut mempool).is_ok());
        assert_eq!(chain.latest_block().height, 1);
    }

    #[test]
    fn test_block_application_updates_ledger_and_mempool() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let sender = KeyPair::generate().unwrap();
        storage
            .save_account(&Account {
                address: sender.address(),
                balance: 1000,
                nonce: 0,
            })
            .unwrap();

        let mut chain = new_chain(storage);
        let producer = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();

        let tx = signed_transfer(&sender, "bob", 100, 10, 0);
        let tx_id = tx.id();
        mempool.add_transaction(tx.clone()).unwrap();

        let block = build_block(&chain, vec![tx], &producer);
        chain.apply_block(&block, &mut mempool).unwrap();

        let account = chain.state.get_account(&sender.address()).unwrap();
        assert_eq!(account.balance, 890);
        assert_eq!(account.nonce, 1);
        assert!(!mempool.contains(&tx_id));
    }

    #[test]
    fn test_failing_transaction_rejects_whole_block() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let sender = KeyPair::generate().unwrap();
        storage
            .save_account(&Account {
                address: sender.address(),
                balance: 1000,
                nonce: 0,
            })
            .unwrap();

        let mut chain = new_chain(storage);
        let producer = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();

        // Second transfer reuses nonce 0, so ledger application fails and
        // the block must not extend the chain.
        let block = build_block(
            &chain,
            vec![
                signed_transfer(&sender, "bob", 100, 10, 0),
                signed_transfer(&sender, "carol", 50, 5, 0),
            ],
            &producer,
        );
        assert!(chain.apply_block(&block, &mut mempool).is_err());

        assert_eq!(chain.latest_block().height, 0);
        let account = chain.state.get_account(&sender.address()).unwrap();
        assert_eq!(account.balance, 1000);
        assert_eq!(account.nonce, 0);
    }

    #[test]
    fn test_stake_in_block_joins_roster() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let staker = KeyPair::generate().unwrap();
        storage
            .save_account(&Account {
                address: staker.address(),
                balance: 1000,
                nonce: 0,
            })
            .unwrap();

        let mut chain = new_chain(storage);
        let producer = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();

        let mut stake = crate::transaction::StakeTx::new(
            staker.address(),
            producer.validator_id(),
            300,
            2,
            0,
        );
        let message = stake.signable_message();
        let signature = staker.sign(&message).unwrap();
        stake.sign(signature.to_vec(), staker.public_key_bytes().to_vec());

        let block = build_block(&chain, vec![Transaction::Stake(stake)], &producer);
        chain.apply_block(&block, &mut mempool).unwrap();

        assert_eq!(chain.staking.get_stake(&producer.validator_id()), 300);
        assert_eq!(chain.staking.active_validators().len(), 1);
    }

    #[test]
    fn test_roster_and_governance_survive_restart() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let staker = KeyPair::generate().unwrap();
        storage
            .save_account(&Account {
                address: staker.address(),
                balance: 1000,
                nonce: 0,
            })
            .unwrap();

        let producer = KeyPair::generate().unwrap();
        {
            let mut chain = new_chain(storage.clone());
            let mut mempool = Mempool::new();

            let mut stake = crate::transaction::StakeTx::new(
                staker.address(),
                producer.validator_id(),
                300,
                2,
                0,
            );
            let message = stake.signable_message();
            let signature = staker.sign(&message).unwrap();
            stake.sign(signature.to_vec(), staker.public_key_bytes().to_vec());

            let block = build_block(&chain, vec![Transaction::Stake(stake)], &producer);
            chain.apply_block(&block, &mut mempool).unwrap();
        }

        // A fresh process over the same storage replays the roster.
        let chain = new_chain(storage);
        assert_eq!(chain.latest_block().height, 1);
        assert_eq!(chain.staking.get_stake(&producer.validator_id()), 300);
    }

    #[test]
    fn test_latest_blocks_descend_and_clip_at_genesis() {
        let mut chain = new_chain(Arc::new(InMemoryStorage::new()));
        let producer = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();

        for _ in 0..3 {
            let block = build_block(&chain, vec![], &producer);
            chain.apply_block(&block, &mut mempool).unwrap();
        }

        let latest = chain.latest_blocks(10).unwrap();
        assert_eq!(latest.len(), 4);
        let heights: Vec<u64> = latest.iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![3, 2, 1, 0]);

        let two = chain.latest_blocks(2).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].height, 3);
    }
}
