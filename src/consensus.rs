//! Block production under the round-robin rotation
//!
//! Consensus assembles and signs a candidate block when the local validator
//! holds the slot for the next height. The rotation is deterministic given
//! the roster, so every node agrees on the producer without messages; the
//! produced block still goes through `Blockchain::apply_block` like any
//! block arriving from a peer.

use crate::blockchain::{Block, Blockchain};
use crate::crypto::KeyPair;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;

pub struct Consensus {
    keypair: KeyPair,
}

impl Consensus {
    pub fn new(keypair: KeyPair) -> Self {
        Consensus { keypair }
    }

    pub fn validator_id(&self) -> String {
        self.keypair.validator_id()
    }

    /// Builds, hashes, and signs the next block from the current mempool.
    /// Fails with `NotMyTurn` when another validator holds the slot. The
    /// returned block is not yet appended; the caller hands it to
    /// `Blockchain::apply_block`.
    pub fn create_block(&self, chain: &Blockchain, mempool: &Mempool) -> Result<Block> {
        let tip = chain.latest_block();

        let selected = chain
            .staking
            .select_validator(tip.height)
            .ok_or(ChainError::NotMyTurn)?;
        if selected != self.keypair.validator_id() {
            return Err(ChainError::NotMyTurn);
        }

        let transactions = mempool.pending_transactions();
        let total_fees = transactions.iter().map(|tx| tx.fee()).sum();

        let mut block = Block {
            height: tip.height + 1,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
            transactions,
            previous_hash: tip.hash,
            hash: [0u8; 32],
            validator: self.keypair.validator_id(),
            signature: Vec::new(),
            total_fees,
        };
        block.hash = block.compute_hash();
        block.signature = self.keypair.sign(&block.hash)?.to_vec();

        Ok(block)
    }
}
