//! Configuration management for RotaChain

use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub staking: StakingConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    pub p2p_port: u16,
    #[serde(default = "default_network_id")]
    pub network_id: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Hex-encoded secp256k1 secret key. Required when `enabled` is true.
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_block_interval")]
    pub block_interval_secs: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret_key: String::new(),
            block_interval_secs: default_block_interval(),
        }
    }
}

/// Stakes seeded into the validator roster at startup, before any Stake
/// transactions are replayed. Roster order follows list order.
#[derive(Debug, Deserialize, Default)]
pub struct StakingConfig {
    #[serde(default)]
    pub genesis_validators: Vec<GenesisStake>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenesisStake {
    pub validator: String,
    pub amount: u64,
}

pub fn load_config(path: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        // Provide sane defaults when the config file is absent
        Config {
            network: NetworkConfig {
                p2p_port: 7070,
                network_id: default_network_id(),
                bootstrap_peers: Vec::new(),
            },
            database: DatabaseConfig {
                path: default_data_path(),
            },
            validator: ValidatorConfig::default(),
            staking: StakingConfig::default(),
        }
    } else {
        toml::from_str(&config_str)?
    };

    // Validate critical values
    if config.database.path.is_empty() {
        return Err("database.path must be set".into());
    }

    if config.validator.enabled && config.validator.secret_key.is_empty() {
        return Err("validator.secret_key must be set when validator.enabled is true".into());
    }

    if config.validator.block_interval_secs == 0 {
        return Err("validator.block_interval_secs must be at least 1".into());
    }

    Ok(config)
}

fn default_network_id() -> String {
    "devnet".to_string()
}

fn default_data_path() -> String {
    "./data/rotachain.db".to_string()
}

fn default_block_interval() -> u64 {
    5
}
