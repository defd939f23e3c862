/// Transaction types for RotaChain
use crate::crypto::{Address, Sha256Hash};
use crate::error::ChainError;
use sha2::{Digest, Sha256};

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Opaque key-value payload carried by contract transactions. Backed by a
/// sorted map so content hashes stay deterministic.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A transaction that can occur in a block
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Transaction {
    Transfer(TransferTx),
    ContractCreation(ContractCreationTx),
    ContractCall(ContractCallTx),
    Stake(StakeTx),
    GovernanceProposal(GovernanceProposalTx),
    GovernanceVote(GovernanceVoteTx),
}

impl Transaction {
    /// The transaction id: hex encoding of the content hash. Unique across
    /// the system and used as the mempool and storage key.
    pub fn id(&self) -> String {
        hex::encode(self.hash())
    }

    /// Calculate the content hash of this transaction
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        match self {
            Transaction::Transfer(tx) => {
                hasher.update("transfer".as_bytes());
                hasher.update(tx.from);
                hasher.update(tx.to);
                hasher.update(tx.amount.to_le_bytes());
                hasher.update(tx.fee.to_le_bytes());
                hasher.update(tx.nonce.to_le_bytes());
            }
            Transaction::ContractCreation(tx) => {
                hasher.update("contract_creation".as_bytes());
                hasher.update(tx.from);
                hasher.update(tx.code.as_bytes());
                hash_json_map(&mut hasher, &tx.initial_state);
                hasher.update(tx.timestamp.to_le_bytes());
                hasher.update(tx.fee.to_le_bytes());
                hasher.update(tx.nonce.to_le_bytes());
            }
            Transaction::ContractCall(tx) => {
                hasher.update("contract_call".as_bytes());
                hasher.update(tx.from);
                hasher.update(tx.contract_id.as_bytes());
                hasher.update(tx.function.as_bytes());
                hash_json_map(&mut hasher, &tx.args);
                hasher.update(tx.fee.to_le_bytes());
                hasher.update(tx.nonce.to_le_bytes());
            }
            Transaction::Stake(tx) => {
                hasher.update("stake".as_bytes());
                hasher.update(tx.from);
                hasher.update(tx.validator.as_bytes());
                hasher.update(tx.amount.to_le_bytes());
                hasher.update(tx.fee.to_le_bytes());
                hasher.update(tx.nonce.to_le_bytes());
            }
            Transaction::GovernanceProposal(tx) => {
                hasher.update("governance_proposal".as_bytes());
                hasher.update(tx.from);
                hasher.update(tx.title.as_bytes());
                hasher.update(tx.description.as_bytes());
                hasher.update(tx.end_block.to_le_bytes());
                hasher.update(tx.timestamp.to_le_bytes());
                hasher.update(tx.fee.to_le_bytes());
                hasher.update(tx.nonce.to_le_bytes());
            }
            Transaction::GovernanceVote(tx) => {
                hasher.update("governance_vote".as_bytes());
                hasher.update(tx.from);
                hasher.update(tx.proposal_id.as_bytes());
                hasher.update(tx.option.as_str().as_bytes());
                hasher.update(tx.fee.to_le_bytes());
                hasher.update(tx.nonce.to_le_bytes());
            }
        };
        hasher.finalize().into()
    }

    pub fn from(&self) -> Address {
        match self {
            Transaction::Transfer(tx) => tx.from,
            Transaction::ContractCreation(tx) => tx.from,
            Transaction::ContractCall(tx) => tx.from,
            Transaction::Stake(tx) => tx.from,
            Transaction::GovernanceProposal(tx) => tx.from,
            Transaction::GovernanceVote(tx) => tx.from,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Transaction::Transfer(tx) => tx.nonce,
            Transaction::ContractCreation(tx) => tx.nonce,
            Transaction::ContractCall(tx) => tx.nonce,
            Transaction::Stake(tx) => tx.nonce,
            Transaction::GovernanceProposal(tx) => tx.nonce,
            Transaction::GovernanceVote(tx) => tx.nonce,
        }
    }

    pub fn fee(&self) -> u64 {
        match self {
            Transaction::Transfer(tx) => tx.fee,
            Transaction::ContractCreation(tx) => tx.fee,
            Transaction::ContractCall(tx) => tx.fee,
            Transaction::Stake(tx) => tx.fee,
            Transaction::GovernanceProposal(tx) => tx.fee,
            Transaction::GovernanceVote(tx) => tx.fee,
        }
    }

    /// The token amount a transaction moves or locks. Zero for every type
    /// other than Transfer and Stake.
    pub fn amount(&self) -> u64 {
        match self {
            Transaction::Transfer(tx) => tx.amount,
            Transaction::Stake(tx) => tx.amount,
            _ => 0,
        }
    }

    pub fn signature(&self) -> Option<&Vec<u8>> {
        match self {
            Transaction::Transfer(tx) => tx.signature.as_ref(),
            Transaction::ContractCreation(tx) => tx.signature.as_ref(),
            Transaction::ContractCall(tx) => tx.signature.as_ref(),
            Transaction::Stake(tx) => tx.signature.as_ref(),
            Transaction::GovernanceProposal(tx) => tx.signature.as_ref(),
            Transaction::GovernanceVote(tx) => tx.signature.as_ref(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Transaction::Transfer(_) => "Transfer",
            Transaction::ContractCreation(_) => "ContractCreation",
            Transaction::ContractCall(_) => "ContractCall",
            Transaction::Stake(_) => "Stake",
            Transaction::GovernanceProposal(_) => "GovernanceProposal",
            Transaction::GovernanceVote(_) => "GovernanceVote",
        }
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = bincode::serialize(self)
            .map_err(|e| ChainError::InvalidTransaction(format!("Serialization failed: {}", e)))?;

        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}

fn hash_json_map(hasher: &mut Sha256, map: &JsonMap) {
    // serde_json::Map iterates in sorted key order, keeping this stable.
    for (key, value) in map {
        hasher.update(key.as_bytes());
        hasher.update(value.to_string().as_bytes());
    }
}

/// Transfer transaction: moves tokens between two accounts
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TransferTx {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl TransferTx {
    pub fn new(from: Address, to: Address, amount: u64, fee: u64, nonce: u64) -> Self {
        TransferTx {
            from,
            to,
            amount,
            fee,
            nonce,
            signature: None,
            public_key: None,
        }
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("TRANSFER:".as_bytes());
        message.extend_from_slice(&self.from);
        message.extend_from_slice(&self.to);
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }
}

/// Contract creation transaction: registers contract code and initial state
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContractCreationTx {
    pub from: Address,
    pub code: String,
    #[serde(default)]
    pub initial_state: JsonMap,
    /// Submission time in milliseconds, folded into the contract id so every
    /// node derives the same id when applying the block.
    pub timestamp: u64,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl ContractCreationTx {
    pub fn new(from: Address, code: String, initial_state: JsonMap, fee: u64, nonce: u64) -> Self {
        ContractCreationTx {
            from,
            code,
            initial_state,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
            fee,
            nonce,
            signature: None,
            public_key: None,
        }
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("CONTRACT_CREATION:".as_bytes());
        message.extend_from_slice(&self.from);
        message.extend_from_slice(self.code.as_bytes());
        message.extend_from_slice(&self.timestamp.to_le_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }
}

/// Contract call transaction: invokes a function on a deployed contract
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContractCallTx {
    pub from: Address,
    pub contract_id: String,
    pub function: String,
    #[serde(default)]
    pub args: JsonMap,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl ContractCallTx {
    pub fn new(
        from: Address,
        contract_id: String,
        function: String,
        args: JsonMap,
        fee: u64,
        nonce: u64,
    ) -> Self {
        ContractCallTx {
            from,
            contract_id,
            function,
            args,
            fee,
            nonce,
            signature: None,
            public_key: None,
        }
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("CONTRACT_CALL:".as_bytes());
        message.extend_from_slice(&self.from);
        message.extend_from_slice(self.contract_id.as_bytes());
        message.extend_from_slice(self.function.as_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }
}

/// Stake transaction: locks tokens behind a validator identity
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StakeTx {
    pub from: Address,
    /// Hex-encoded compressed public key of the validator being staked.
    pub validator: String,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl StakeTx {
    pub fn new(from: Address, validator: String, amount: u64, fee: u64, nonce: u64) -> Self {
        StakeTx {
            from,
            validator,
            amount,
            fee,
            nonce,
            signature: None,
            public_key: None,
        }
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("STAKE:".as_bytes());
        message.extend_from_slice(&self.from);
        message.extend_from_slice(self.validator.as_bytes());
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }
}

/// Governance proposal transaction
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GovernanceProposalTx {
    pub from: Address,
    pub title: String,
    pub description: String,
    /// Height at which voting closes.
    pub end_block: u64,
    /// Submission time in milliseconds, folded into the proposal id.
    pub timestamp: u64,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl GovernanceProposalTx {
    pub fn new(from: Address, title: String, description: String, end_block: u64, fee: u64, nonce: u64) -> Self {
        GovernanceProposalTx {
            from,
            title,
            description,
            end_block,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
            fee,
            nonce,
            signature: None,
            public_key: None,
        }
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("GOVERNANCE_PROPOSAL:".as_bytes());
        message.extend_from_slice(&self.from);
        message.extend_from_slice(self.title.as_bytes());
        message.extend_from_slice(self.description.as_bytes());
        message.extend_from_slice(&self.end_block.to_le_bytes());
        message.extend_from_slice(&self.timestamp.to_le_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }
}

/// Governance vote transaction
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GovernanceVoteTx {
    pub from: Address,
    pub proposal_id: String,
    pub option: VoteOption,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl GovernanceVoteTx {
    pub fn new(from: Address, proposal_id: String, option: VoteOption, fee: u64, nonce: u64) -> Self {
        GovernanceVoteTx {
            from,
            proposal_id,
            option,
            fee,
            nonce,
            signature: None,
            public_key: None,
        }
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("GOVERNANCE_VOTE:".as_bytes());
        message.extend_from_slice(&self.from);
        message.extend_from_slice(self.proposal_id.as_bytes());
        message.extend_from_slice(self.option.as_str().as_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOption {
    Yes,
    No,
    Abstain,
}

impl VoteOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteOption::Yes => "yes",
            VoteOption::No => "no",
            VoteOption::Abstain => "abstain",
        }
    }
}
