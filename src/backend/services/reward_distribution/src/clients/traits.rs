use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{
    chain::{BlockHeader, CycleInfo, Transaction, TransactionFilter},
    payout::{PayoutReport, ResumePoint, TransferInstruction},
    reward::{Mutez, RewardSnapshot},
};

/// Blockchain node access needed by the payout pipeline.
///
/// `block` arguments accept anything the node resolves as a block id
/// (`"head"`, a level, or a block hash).
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_block_header(&self) -> Result<BlockHeader>;

    async fn account_counter(&self, block: &str, address: &str) -> Result<u64>;

    async fn account_balance(&self, block: &str, address: &str) -> Result<Mutez>;

    /// Returns the unsigned operation bytes, hex encoded.
    async fn forge_operation(&self, branch: &str, contents: &[TransferInstruction]) -> Result<String>;

    /// Returns the signed operation bytes, hex encoded.
    async fn sign(&self, unsigned: &str, key: &str) -> Result<String>;

    /// Returns the operation hash.
    async fn inject_operation(&self, signed: &str) -> Result<String>;

    /// Operation hashes included in a block, grouped by validation pass.
    async fn included_operation_hashes(&self, block: &str) -> Result<Vec<Vec<String>>>;

    async fn contract_storage(&self, block: &str, address: &str) -> Result<Value>;

    /// `None` when the key is absent from the big-map.
    async fn big_map_entry(&self, block: &str, map_id: u64, key: &str) -> Result<Option<Value>>;
}

#[async_trait]
pub trait IndexerClient: Send + Sync {
    async fn reward_split(&self, baker: &str, cycle: u32) -> Result<RewardSnapshot>;

    async fn cycle_info(&self, cycle: u32) -> Result<CycleInfo>;

    async fn search_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
}

/// Outbound notification fired after a cycle was paid.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &PayoutReport) -> Result<()>;
}

/// Something able to pay out one cycle.
///
/// `from` is `ResumePoint::default()` for a cycle that was never attempted.
#[async_trait]
pub trait CyclePayout: Send + Sync {
    async fn execute(&self, cycle: u32, from: ResumePoint) -> Result<PayoutReport>;
}
