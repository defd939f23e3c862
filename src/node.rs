//! Node orchestrator
//!
//! Wires storage, ledger, staking, governance, contracts, blockchain,
//! mempool, and the gossip transport together, then drives the single event
//! loop that owns every state mutation: inbound gossip and the production
//! timer are the only two triggers.

use crate::blockchain::{Block, Blockchain};
use crate::config::Config;
use crate::consensus::Consensus;
use crate::contracts::{ContractEngine, ContractMeta, ContractState};
use crate::crypto::{Address, KeyPair};
use crate::error::ChainError;
use crate::governance::{GovernanceModule, Proposal};
use crate::mempool::Mempool;
use crate::network::{GossipMessage, NetworkService};
use crate::staking::{Stake, StakingManager};
use crate::state::{Account, StateManager};
use crate::storage::{Database, InMemoryStorage, Storage};
use crate::transaction::Transaction;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Depth of the inbound gossip channel; peers block on a full channel
/// instead of buffering unboundedly.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum NodeState {
    Booting,
    Ready,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeStatus {
    pub network_id: String,
    pub state: NodeState,
    pub height: u64,
    pub latest_hash: String,
    pub pending_transactions: usize,
    pub connected_peers: usize,
}

pub struct Node {
    pub config: Config,
    pub chain: Arc<RwLock<Blockchain>>,
    pub mempool: Arc<RwLock<Mempool>>,
    pub network: Arc<NetworkService>,
    consensus: Option<Consensus>,
    state: Arc<RwLock<NodeState>>,
    events: Mutex<mpsc::Receiver<GossipMessage>>,
}

impl Node {
    pub async fn init(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let _ = tracing_subscriber::fmt::try_init();
        info!(
            "Starting RotaChain node (network_id = {})",
            config.network.network_id
        );

        // Ensure the data directory (parent of the DB path) exists.
        let db_path = std::path::Path::new(&config.database.path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create data dir {:?}: {}", parent, e))?;
            }
        }

        let storage: Arc<dyn Storage> = match Database::open(&config.database.path) {
            Ok(db) => Arc::new(db),
            Err(e) => {
                warn!(
                    "Failed to open DB at {}: {}. Falling back to in-memory storage.",
                    config.database.path, e
                );
                Arc::new(InMemoryStorage::new())
            }
        };

        let mut staking = StakingManager::new();
        for genesis_stake in &config.staking.genesis_validators {
            staking.process_stake(&genesis_stake.validator, genesis_stake.amount);
        }

        let chain = Blockchain::new(
            storage.clone(),
            StateManager::new(storage.clone()),
            staking,
            GovernanceModule::new(),
            ContractEngine::new(storage),
        )?;
        info!("Chain loaded at height {}", chain.latest_block().height);

        let consensus = if config.validator.enabled {
            let keypair = KeyPair::from_secret_hex(&config.validator.secret_key)?;
            info!("Validator enabled with identity {}", keypair.validator_id());
            Some(Consensus::new(keypair))
        } else {
            None
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let network = Arc::new(NetworkService::new(inbound_tx));

        Ok(Node {
            config,
            chain: Arc::new(RwLock::new(chain)),
            mempool: Arc::new(RwLock::new(Mempool::new())),
            network,
            consensus,
            state: Arc::new(RwLock::new(NodeState::Booting)),
            events: Mutex::new(inbound_rx),
        })
    }

    /// Runs the node until process shutdown: starts the listener, dials the
    /// static peer list, then serializes every state mutation through one
    /// select loop over inbound gossip and the production timer.
    pub async fn run(self: Arc<Self>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.network
            .clone()
            .listen(self.config.network.p2p_port)
            .await?;

        for peer in &self.config.network.bootstrap_peers {
            self.network.clone().connect_peer(peer).await;
        }

        {
            let mut state = self.state.write().await;
            *state = NodeState::Ready;
        }
        info!("Node ready");

        let mut events = self.events.lock().await;
        let mut producer_tick =
            tokio::time::interval(Duration::from_secs(self.config.validator.block_interval_secs));

        loop {
            tokio::select! {
                Some(message) = events.recv() => {
                    self.handle_gossip(message).await;
                }
                _ = producer_tick.tick() => {
                    self.produce_block().await;
                }
            }
        }
    }

    async fn handle_gossip(&self, message: GossipMessage) {
        match message {
            GossipMessage::NewBlock(block) => {
                let mut chain = self.chain.write().await;
                let mut mempool = self.mempool.write().await;
                match chain.apply_block(&block, &mut mempool) {
                    Ok(()) => info!(
                        "Accepted block {} from gossip ({} transactions)",
                        block.height,
                        block.transactions.len()
                    ),
                    // Losing a height race to our own producer lands here
                    // too; the rejection is expected, not an error.
                    Err(e) => warn!("Rejected gossiped block {}: {}", block.height, e),
                }
            }
            GossipMessage::NewTransaction(transaction) => {
                let mut mempool = self.mempool.write().await;
                match mempool.add_transaction(transaction) {
                    Ok(true) => debug!("Admitted gossiped transaction"),
                    Ok(false) => {}
                    Err(e) => debug!("Rejected gossiped transaction: {}", e),
                }
            }
        }
    }

    async fn produce_block(&self) {
        let consensus = match &self.consensus {
            Some(consensus) => consensus,
            None => return,
        };

        let produced = {
            let chain = self.chain.read().await;
            let mempool = self.mempool.read().await;
            if mempool.is_empty() {
                return;
            }
            consensus.create_block(&chain, &mempool)
        };

        let block = match produced {
            Ok(block) => block,
            Err(ChainError::NotMyTurn) => {
                debug!("Production tick skipped: not our slot");
                return;
            }
            Err(e) => {
                warn!("Block production failed: {}", e);
                return;
            }
        };

        let accepted = {
            let mut chain = self.chain.write().await;
            let mut mempool = self.mempool.write().await;
            chain.apply_block(&block, &mut mempool)
        };

        match accepted {
            Ok(()) => {
                info!(
                    "Produced block {} ({} transactions, {} fees)",
                    block.height,
                    block.transactions.len(),
                    block.total_fees
                );
                if let Err(e) = self.network.broadcast_block(&block) {
                    warn!("Failed to broadcast block {}: {}", block.height, e);
                }
            }
            Err(e) => warn!("Produced block {} was rejected: {}", block.height, e),
        }
    }

    // ------------------------------------------------------------------
    // External interface consumed by the RPC layer
    // ------------------------------------------------------------------

    pub async fn status(&self) -> NodeStatus {
        let chain = self.chain.read().await;
        let tip = chain.latest_block();
        NodeStatus {
            network_id: self.config.network.network_id.clone(),
            state: *self.state.read().await,
            height: tip.height,
            latest_hash: tip.hash_hex(),
            pending_transactions: self.mempool.read().await.len(),
            connected_peers: self.network.peer_count(),
        }
    }

    /// Admits a transaction and gossips it to peers on success. Returns
    /// whether the transaction entered the pool.
    pub async fn submit_transaction(&self, transaction: Transaction) -> crate::error::Result<bool> {
        let admitted = {
            let mut mempool = self.mempool.write().await;
            mempool.add_transaction(transaction.clone())?
        };
        if admitted {
            self.network.broadcast_transaction(&transaction)?;
        }
        Ok(admitted)
    }

    pub async fn get_block(&self, height: u64) -> crate::error::Result<Block> {
        self.chain.read().await.get_block(height)
    }

    pub async fn get_latest_blocks(&self, n: usize) -> crate::error::Result<Vec<Block>> {
        self.chain.read().await.latest_blocks(n)
    }

    pub async fn get_account(&self, address: &Address) -> crate::error::Result<Account> {
        self.chain.read().await.state.get_account(address)
    }

    pub async fn active_validators(&self) -> Vec<Stake> {
        self.chain.read().await.staking.active_validators()
    }

    pub async fn proposals(&self) -> Vec<Proposal> {
        self.chain.read().await.governance.proposals()
    }

    pub async fn deployed_contracts(&self) -> crate::error::Result<Vec<ContractMeta>> {
        self.chain.read().await.contracts.deployed_contracts()
    }

    pub async fn contract_state(&self, id: &str) -> crate::error::Result<ContractState> {
        self.chain.read().await.contracts.get_contract_state(id)
    }
}
