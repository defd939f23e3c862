/// Admission validation for transactions, separated from type definitions
use crate::error::ChainError;
use crate::transaction::types::Transaction;

impl Transaction {
    /// Stateless admission checks performed before a transaction enters the
    /// mempool. Account nonce and balance are not consulted here; those are
    /// enforced when the transaction is applied as part of a block.
    pub fn validate_admission(&self) -> Result<(), ChainError> {
        self.validate_size()?;

        if self.from() == [0; 32] {
            return Err(ChainError::InvalidTransaction(
                "Sender address cannot be empty".to_string(),
            ));
        }

        if self.signature().is_none() {
            return Err(ChainError::InvalidTransaction(
                "Transaction not signed".to_string(),
            ));
        }

        match self {
            Transaction::Transfer(tx) => {
                if tx.amount == 0 {
                    return Err(ChainError::InvalidTransaction(
                        "Transfer amount must be greater than zero".to_string(),
                    ));
                }
                if tx.to == [0; 32] {
                    return Err(ChainError::InvalidTransaction(
                        "Transfer recipient cannot be empty".to_string(),
                    ));
                }
            }
            Transaction::Stake(tx) => {
                if tx.amount == 0 {
                    return Err(ChainError::InvalidTransaction(
                        "Stake amount must be greater than zero".to_string(),
                    ));
                }
                if tx.validator.is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Stake validator cannot be empty".to_string(),
                    ));
                }
            }
            Transaction::ContractCreation(tx) => {
                if tx.code.is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Contract code cannot be empty".to_string(),
                    ));
                }
            }
            Transaction::ContractCall(tx) => {
                if tx.contract_id.is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Contract id cannot be empty".to_string(),
                    ));
                }
                if tx.function.is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Contract function cannot be empty".to_string(),
                    ));
                }
            }
            Transaction::GovernanceProposal(tx) => {
                if tx.title.is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Proposal title cannot be empty".to_string(),
                    ));
                }
            }
            Transaction::GovernanceVote(tx) => {
                if tx.proposal_id.is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Vote proposal id cannot be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Validates just the signature of the transaction against its signable
    /// message. Useful for callers that want more than presence checks.
    pub fn validate_signature(&self) -> Result<(), ChainError> {
        let (signature, public_key) = match self {
            Transaction::Transfer(tx) => (&tx.signature, &tx.public_key),
            Transaction::ContractCreation(tx) => (&tx.signature, &tx.public_key),
            Transaction::ContractCall(tx) => (&tx.signature, &tx.public_key),
            Transaction::Stake(tx) => (&tx.signature, &tx.public_key),
            Transaction::GovernanceProposal(tx) => (&tx.signature, &tx.public_key),
            Transaction::GovernanceVote(tx) => (&tx.signature, &tx.public_key),
        };

        let (signature, public_key) = match (signature, public_key) {
            (Some(sig), Some(pk)) => (sig, pk),
            _ => {
                return Err(ChainError::InvalidTransaction(
                    "Transaction not signed".to_string(),
                ))
            }
        };

        let message = match self {
            Transaction::Transfer(tx) => tx.signable_message(),
            Transaction::ContractCreation(tx) => tx.signable_message(),
            Transaction::ContractCall(tx) => tx.signable_message(),
            Transaction::Stake(tx) => tx.signable_message(),
            Transaction::GovernanceProposal(tx) => tx.signable_message(),
            Transaction::GovernanceVote(tx) => tx.signable_message(),
        };
        crate::crypto::verify_signature(public_key, &message, signature)?;

        Ok(())
    }
}
