//! Simulated contract engine
//!
//! Contracts here are a deterministic key-value simulation, not a sandboxed
//! bytecode interpreter. Code is stored verbatim; execution dispatches on
//! function name against the contract's persisted state map.

use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::storage::Storage;
use crate::transaction::{ContractCallTx, ContractCreationTx};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Opaque contract state: string keys to arbitrary JSON values.
pub type ContractState = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContractMeta {
    pub id: String,
    pub owner: Address,
    pub created_at: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: Option<String>,
    pub state: ContractState,
}

pub struct ContractEngine {
    storage: Arc<dyn Storage>,
}

impl ContractEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        ContractEngine { storage }
    }

    /// Deploys a contract: derives its id from deployer, code, and
    /// deployment time, persists the initial state, and registers the
    /// contract for discovery.
    pub fn deploy_contract(&self, tx: &ContractCreationTx) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(tx.from);
        hasher.update(tx.code.as_bytes());
        hasher.update(tx.timestamp.to_le_bytes());
        let id = hex::encode(hasher.finalize());

        self.storage.save_contract_state(&id, &tx.initial_state)?;
        self.storage.register_contract(&ContractMeta {
            id: id.clone(),
            owner: tx.from,
            created_at: tx.timestamp,
        })?;

        Ok(id)
    }

    /// Executes a function call against a deployed contract. Built-ins:
    /// `get_state` returns the state unmodified and `set_state` writes one
    /// key; any other function name succeeds generically without touching
    /// state. The resulting state is re-persisted after every call.
    pub fn execute_contract(&self, tx: &ContractCallTx) -> Result<ExecutionResult> {
        let state = match self.storage.get_contract_state(&tx.contract_id) {
            Ok(state) => state,
            Err(ChainError::NotFound(_)) => {
                return Err(ChainError::ContractNotFound(tx.contract_id.clone()))
            }
            Err(e) => return Err(e),
        };

        let result = match tx.function.as_str() {
            "get_state" => ExecutionResult {
                success: true,
                message: None,
                state,
            },
            "set_state" => {
                let key = match tx.args.get("key") {
                    Some(serde_json::Value::String(key)) => key.clone(),
                    Some(_) => {
                        return Err(ChainError::InvalidTransaction(
                            "set_state key must be a string".to_string(),
                        ))
                    }
                    None => {
                        return Err(ChainError::InvalidTransaction(
                            "set_state requires a key argument".to_string(),
                        ))
                    }
                };
                let value = tx
                    .args
                    .get("value")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);

                let mut new_state = state;
                new_state.insert(key, value);
                ExecutionResult {
                    success: true,
                    message: None,
                    state: new_state,
                }
            }
            other => ExecutionResult {
                success: true,
                message: Some(format!("Function '{}' executed", other)),
                state,
            },
        };

        self.storage
            .save_contract_state(&tx.contract_id, &result.state)?;

        Ok(result)
    }

    pub fn get_contract_state(&self, id: &str) -> Result<ContractState> {
        match self.storage.get_contract_state(id) {
            Ok(state) => Ok(state),
            Err(ChainError::NotFound(_)) => Err(ChainError::ContractNotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    pub fn deployed_contracts(&self) -> Result<Vec<ContractMeta>> {
        self.storage.deployed_contracts()
    }
}
