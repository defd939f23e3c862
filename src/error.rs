//! Error types for RotaChain

use std::fmt;

#[derive(Debug, Clone)]
pub enum ChainError {
    InvalidBlock(String),
    InvalidTransaction(String),
    NotMyTurn,
    ContractNotFound(String),
    ProposalNotFound(String),
    NotFound(String),
    DatabaseError(String),
    NetworkError(String),
    CryptoError(String),
    ConfigError(String),
    IoError(String),
    BincodeError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::InvalidBlock(msg) => write!(f, "Invalid block: {}", msg),
            ChainError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {}", msg),
            ChainError::NotMyTurn => write!(f, "Not this validator's turn"),
            ChainError::ContractNotFound(id) => write!(f, "Contract not found: {}", id),
            ChainError::ProposalNotFound(id) => write!(f, "Proposal not found: {}", id),
            ChainError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ChainError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ChainError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ChainError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ChainError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
            ChainError::BincodeError(msg) => write!(f, "Bincode error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::BincodeError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
