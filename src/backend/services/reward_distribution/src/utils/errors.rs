use thiserror::Error;

use crate::models::reward::Mutez;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayoutError {
    #[error("Invalid reward snapshot for cycle {cycle}: {reason}")]
    InvalidSnapshot { cycle: u32, reason: String },

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    #[error("Malformed storage for contract {contract}: {reason}")]
    MalformedStorage { contract: String, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient balance in {wallet}: need {required} mutez, have {available} mutez")]
    InsufficientBalance {
        wallet: String,
        required: Mutez,
        available: Mutez,
    },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, PayoutError>;
