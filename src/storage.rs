//! Database persistence layer for RotaChain

use crate::blockchain::Block;
use crate::contracts::{ContractMeta, ContractState};
use crate::crypto::Address;
use crate::error::ChainError;
use crate::state::Account;
use crate::transaction::Transaction;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

/// Abstraction for persistence backends. Lookups that miss return
/// `ChainError::NotFound`, distinct from I/O failures which surface as
/// `ChainError::DatabaseError`.
pub trait Storage: Send + Sync {
    fn get_block(&self, height: u64) -> Result<Block, ChainError>;
    fn get_latest_block(&self) -> Result<Block, ChainError>;
    /// Persists a block and advances the latest-block pointer atomically.
    fn save_block(&self, block: &Block) -> Result<(), ChainError>;
    /// Persists a block, the latest-block pointer, and every touched account
    /// in a single atomic commit.
    fn commit_block(&self, block: &Block, accounts: &[Account]) -> Result<(), ChainError>;
    fn get_account(&self, address: &Address) -> Result<Account, ChainError>;
    fn save_account(&self, account: &Account) -> Result<(), ChainError>;
    fn batch_update_accounts(&self, accounts: &[Account]) -> Result<(), ChainError>;
    fn get_contract_state(&self, id: &str) -> Result<ContractState, ChainError>;
    fn save_contract_state(&self, id: &str, state: &ContractState) -> Result<(), ChainError>;
    fn register_contract(&self, meta: &ContractMeta) -> Result<(), ChainError>;
    fn deployed_contracts(&self) -> Result<Vec<ContractMeta>, ChainError>;
}

const LATEST_HEIGHT_KEY: &str = "latest_height";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash BLOB NOT NULL,
                previous_hash BLOB NOT NULL,
                timestamp INTEGER NOT NULL,
                validator TEXT NOT NULL,
                signature BLOB NOT NULL,
                total_fees INTEGER NOT NULL,
                transactions TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create metadata table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                address BLOB PRIMARY KEY,
                balance INTEGER NOT NULL,
                nonce INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create accounts table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS contracts (
                id TEXT PRIMARY KEY,
                owner BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create contracts table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS contract_state (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create contract_state table: {}", e))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }
}

fn row_to_block(row: &rusqlite::Row) -> rusqlite::Result<Block> {
    let height: i64 = row.get(0)?;
    let hash_vec: Vec<u8> = row.get(1)?;
    let previous_hash_vec: Vec<u8> = row.get(2)?;
    let timestamp: i64 = row.get(3)?;
    let validator: String = row.get(4)?;
    let signature: Vec<u8> = row.get(5)?;
    let total_fees: i64 = row.get(6)?;
    let transactions_json: String = row.get(7)?;

    let transactions: Vec<Transaction> =
        serde_json::from_str(&transactions_json).map_err(|_| rusqlite::Error::InvalidQuery)?;

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hash_vec);
    let mut previous_hash = [0u8; 32];
    previous_hash.copy_from_slice(&previous_hash_vec);

    Ok(Block {
        height: height as u64,
        timestamp: timestamp as u64,
        transactions,
        previous_hash,
        hash,
        validator,
        signature,
        total_fees: total_fees as u64,
    })
}

fn insert_block(conn: &Connection, block: &Block) -> Result<(), ChainError> {
    let transactions_json = serde_json::to_string(&block.transactions).map_err(|e| {
        ChainError::DatabaseError(format!("Failed to serialize transactions: {}", e))
    })?;

    conn.execute(
        "INSERT OR REPLACE INTO blocks (height, hash, previous_hash, timestamp, validator, signature, total_fees, transactions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            block.height as i64,
            block.hash.to_vec(),
            block.previous_hash.to_vec(),
            block.timestamp as i64,
            block.validator,
            block.signature,
            block.total_fees as i64,
            transactions_json,
        ],
    )
    .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![LATEST_HEIGHT_KEY, block.height.to_string()],
    )
    .map_err(|e| ChainError::DatabaseError(format!("Failed to update latest pointer: {}", e)))?;

    Ok(())
}

fn insert_account(conn: &Connection, account: &Account) -> Result<(), ChainError> {
    conn.execute(
        "INSERT OR REPLACE INTO accounts (address, balance, nonce) VALUES (?1, ?2, ?3)",
        params![
            account.address.to_vec(),
            account.balance as i64,
            account.nonce as i64
        ],
    )
    .map_err(|e| ChainError::DatabaseError(format!("Failed to save account: {}", e)))?;
    Ok(())
}

impl Storage for Database {
    fn get_block(&self, height: u64) -> Result<Block, ChainError> {
        let conn = self.lock()?;
        let block = conn
            .query_row(
                "SELECT height, hash, previous_hash, timestamp, validator, signature, total_fees, transactions
                 FROM blocks WHERE height = ?1",
                params![height as i64],
                row_to_block,
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query block: {}", e)))?;

        block.ok_or_else(|| ChainError::NotFound(format!("block at height {}", height)))
    }

    fn get_latest_block(&self) -> Result<Block, ChainError> {
        let latest = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![LATEST_HEIGHT_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| {
                ChainError::DatabaseError(format!("Failed to query latest pointer: {}", e))
            })?
        };

        let height = latest
            .ok_or_else(|| ChainError::NotFound("latest block pointer".to_string()))?
            .parse::<u64>()
            .map_err(|e| ChainError::DatabaseError(format!("Corrupt latest pointer: {}", e)))?;

        self.get_block(height)
    }

    fn save_block(&self, block: &Block) -> Result<(), ChainError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;
        insert_block(&tx, block)?;
        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    fn commit_block(&self, block: &Block, accounts: &[Account]) -> Result<(), ChainError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        insert_block(&tx, block)?;
        for account in accounts {
            insert_account(&tx, account)?;
        }

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    fn get_account(&self, address: &Address) -> Result<Account, ChainError> {
        let conn = self.lock()?;
        let account = conn
            .query_row(
                "SELECT address, balance, nonce FROM accounts WHERE address = ?1",
                params![address.to_vec()],
                |row| {
                    let address_vec: Vec<u8> = row.get(0)?;
                    let balance: i64 = row.get(1)?;
                    let nonce: i64 = row.get(2)?;
                    let mut address = [0u8; 32];
                    address.copy_from_slice(&address_vec);
                    Ok(Account {
                        address,
                        balance: balance as u64,
                        nonce: nonce as u64,
                    })
                },
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query account: {}", e)))?;

        account.ok_or_else(|| ChainError::NotFound(format!("account {}", hex::encode(address))))
    }

    fn save_account(&self, account: &Account) -> Result<(), ChainError> {
        let conn = self.lock()?;
        insert_account(&conn, account)
    }

    fn batch_update_accounts(&self, accounts: &[Account]) -> Result<(), ChainError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;
        for account in accounts {
            insert_account(&tx, account)?;
        }
        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    fn get_contract_state(&self, id: &str) -> Result<ContractState, ChainError> {
        let conn = self.lock()?;
        let state_json = conn
            .query_row(
                "SELECT state FROM contract_state WHERE id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| {
                ChainError::DatabaseError(format!("Failed to query contract state: {}", e))
            })?;

        let state_json =
            state_json.ok_or_else(|| ChainError::NotFound(format!("contract state {}", id)))?;

        serde_json::from_str(&state_json).map_err(|e| {
            ChainError::DatabaseError(format!("Failed to deserialize contract state: {}", e))
        })
    }

    fn save_contract_state(&self, id: &str, state: &ContractState) -> Result<(), ChainError> {
        let state_json = serde_json::to_string(state).map_err(|e| {
            ChainError::DatabaseError(format!("Failed to serialize contract state: {}", e))
        })?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO contract_state (id, state) VALUES (?1, ?2)",
            params![id, state_json],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save contract state: {}", e)))?;
        Ok(())
    }

    fn register_contract(&self, meta: &ContractMeta) -> Result<(), ChainError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO contracts (id, owner, created_at) VALUES (?1, ?2, ?3)",
            params![meta.id, meta.owner.to_vec(), meta.created_at as i64],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to register contract: {}", e)))?;
        Ok(())
    }

    fn deployed_contracts(&self) -> Result<Vec<ContractMeta>, ChainError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, owner, created_at FROM contracts ORDER BY created_at ASC")
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let owner_vec: Vec<u8> = row.get(1)?;
                let created_at: i64 = row.get(2)?;
                let mut owner = [0u8; 32];
                owner.copy_from_slice(&owner_vec);
                Ok(ContractMeta {
                    id,
                    owner,
                    created_at: created_at as u64,
                })
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query contracts: {}", e)))?;

        let mut contracts = Vec::new();
        for row in rows {
            contracts.push(
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to read row: {}", e)))?,
            );
        }
        Ok(contracts)
    }
}

/// Simple in-memory storage implementation useful for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryStorage {
    blocks: Mutex<HashMap<u64, Block>>,
    latest: Mutex<Option<u64>>,
    accounts: Mutex<HashMap<Address, Account>>,
    contracts: Mutex<Vec<ContractMeta>>,
    contract_state: Mutex<HashMap<String, ContractState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> ChainError {
        ChainError::DatabaseError("Mutex poisoned".to_string())
    }
}

impl Storage for InMemoryStorage {
    fn get_block(&self, height: u64) -> Result<Block, ChainError> {
        let blocks = self.blocks.lock().map_err(|_| Self::poisoned())?;
        blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("block at height {}", height)))
    }

    fn get_latest_block(&self) -> Result<Block, ChainError> {
        let latest = self.latest.lock().map_err(|_| Self::poisoned())?;
        let height =
            latest.ok_or_else(|| ChainError::NotFound("latest block pointer".to_string()))?;
        drop(latest);
        self.get_block(height)
    }

    fn save_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut blocks = self.blocks.lock().map_err(|_| Self::poisoned())?;
        let mut latest = self.latest.lock().map_err(|_| Self::poisoned())?;
        blocks.insert(block.height, block.clone());
        *latest = Some(block.height);
        Ok(())
    }

    fn commit_block(&self, block: &Block, accounts: &[Account]) -> Result<(), ChainError> {
        self.save_block(block)?;
        self.batch_update_accounts(accounts)
    }

    fn get_account(&self, address: &Address) -> Result<Account, ChainError> {
        let accounts = self.accounts.lock().map_err(|_| Self::poisoned())?;
        accounts
            .get(address)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("account {}", hex::encode(address))))
    }

    fn save_account(&self, account: &Account) -> Result<(), ChainError> {
        let mut accounts = self.accounts.lock().map_err(|_| Self::poisoned())?;
        accounts.insert(account.address, account.clone());
        Ok(())
    }

    fn batch_update_accounts(&self, updated: &[Account]) -> Result<(), ChainError> {
        let mut accounts = self.accounts.lock().map_err(|_| Self::poisoned())?;
        for account in updated {
            accounts.insert(account.address, account.clone());
        }
        Ok(())
    }

    fn get_contract_state(&self, id: &str) -> Result<ContractState, ChainError> {
        let state = self.contract_state.lock().map_err(|_| Self::poisoned())?;
        state
            .get(id)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("contract state {}", id)))
    }

    fn save_contract_state(&self, id: &str, new_state: &ContractState) -> Result<(), ChainError> {
        let mut state = self.contract_state.lock().map_err(|_| Self::poisoned())?;
        state.insert(id.to_string(), new_state.clone());
        Ok(())
    }

    fn register_contract(&self, meta: &ContractMeta) -> Result<(), ChainError> {
        let mut contracts = self.contracts.lock().map_err(|_| Self::poisoned())?;
        contracts.retain(|c| c.id != meta.id);
        contracts.push(meta.clone());
        Ok(())
    }

    fn deployed_contracts(&self) -> Result<Vec<ContractMeta>, ChainError> {
        let contracts = self.contracts.lock().map_err(|_| Self::poisoned())?;
        Ok(contracts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Block;
    use crate::crypto::address_from_string;
    use tempfile::TempDir;

    fn open_temp_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_database_open() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.conn.lock().unwrap().is_autocommit());
    }

    #[test]
    fn test_missing_block_is_not_found() {
        let db = Database::open(":memory:").unwrap();
        match db.get_block(42) {
            Err(ChainError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }
        match db.get_latest_block() {
            Err(ChainError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_block_round_trip_and_latest_pointer() {
        let (_dir, db) = open_temp_db();

        let genesis = Block::genesis();
        db.save_block(&genesis).unwrap();

        let loaded = db.get_block(0).unwrap();
        assert_eq!(loaded.height, 0);
        assert_eq!(loaded.hash, genesis.hash);
        assert_eq!(loaded.validator, genesis.validator);

        let latest = db.get_latest_block().unwrap();
        assert_eq!(latest.height, 0);
        assert_eq!(latest.hash, genesis.hash);
    }

    #[test]
    fn test_account_round_trip() {
        let db = Database::open(":memory:").unwrap();
        let address = address_from_string("alice");

        match db.get_account(&address) {
            Err(ChainError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }

        let account = Account {
            address,
            balance: 1000,
            nonce: 3,
        };
        db.save_account(&account).unwrap();

        let loaded = db.get_account(&address).unwrap();
        assert_eq!(loaded.balance, 1000);
        assert_eq!(loaded.nonce, 3);
    }

    #[test]
    fn test_commit_block_persists_accounts_with_block() {
        let (_dir, db) = open_temp_db();

        let genesis = Block::genesis();
        let account = Account {
            address: address_from_string("alice"),
            balance: 77,
            nonce: 1,
        };
        db.commit_block(&genesis, &[account.clone()]).unwrap();

        assert_eq!(db.get_latest_block().unwrap().height, 0);
        assert_eq!(db.get_account(&account.address).unwrap().balance, 77);
    }

    #[test]
    fn test_contract_state_round_trip() {
        let db = Database::open(":memory:").unwrap();

        match db.get_contract_state("missing") {
            Err(ChainError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }

        let mut state = ContractState::new();
        state.insert("greeting".to_string(), serde_json::json!("hello"));
        db.save_contract_state("c1", &state).unwrap();

        let meta = ContractMeta {
            id: "c1".to_string(),
            owner: address_from_string("deployer"),
            created_at: 12345,
        };
        db.register_contract(&meta).unwrap();

        let loaded = db.get_contract_state("c1").unwrap();
        assert_eq!(loaded.get("greeting"), Some(&serde_json::json!("hello")));

        let contracts = db.deployed_contracts().unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].id, "c1");
    }
}
