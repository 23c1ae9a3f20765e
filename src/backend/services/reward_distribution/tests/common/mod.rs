#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use serde_json::{json, Value};

use reward_distribution::{
    clients::{ChainClient, CyclePayout, IndexerClient, Notifier},
    config::{ConfirmationSettings, PayoutSettings},
    models::{
        chain::{BlockHeader, CycleInfo, Transaction, TransactionFilter},
        payout::{PayoutReport, ResumePoint, TransferInstruction},
        reward::{Mutez, Recipient, RewardSnapshot},
    },
};

mock! {
    pub Chain {}
    #[async_trait]
    impl ChainClient for Chain {
        async fn current_block_header(&self) -> Result<BlockHeader>;
        async fn account_counter(&self, block: &str, address: &str) -> Result<u64>;
        async fn account_balance(&self, block: &str, address: &str) -> Result<Mutez>;
        async fn forge_operation(&self, branch: &str, contents: &[TransferInstruction]) -> Result<String>;
        async fn sign(&self, unsigned: &str, key: &str) -> Result<String>;
        async fn inject_operation(&self, signed: &str) -> Result<String>;
        async fn included_operation_hashes(&self, block: &str) -> Result<Vec<Vec<String>>>;
        async fn contract_storage(&self, block: &str, address: &str) -> Result<Value>;
        async fn big_map_entry(&self, block: &str, map_id: u64, key: &str) -> Result<Option<Value>>;
    }
}

mock! {
    pub Indexer {}
    #[async_trait]
    impl IndexerClient for Indexer {
        async fn reward_split(&self, baker: &str, cycle: u32) -> Result<RewardSnapshot>;
        async fn cycle_info(&self, cycle: u32) -> Result<CycleInfo>;
        async fn search_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
    }
}

mock! {
    pub Payout {}
    #[async_trait]
    impl CyclePayout for Payout {
        async fn execute(&self, cycle: u32, from: ResumePoint) -> Result<PayoutReport>;
    }
}

mock! {
    pub Notify {}
    #[async_trait]
    impl Notifier for Notify {
        async fn notify(&self, report: &PayoutReport) -> Result<()>;
    }
}

pub const BAKER: &str = "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb";
pub const WALLET: &str = "tz1aSkwEot3L2kmUvcoxzjMomb9mvBNuzFK6";
pub const POOL: &str = "KT1DrJV8vhkdLEj76h1H9Q4irZDqAkMPo1Qf";
pub const PROVIDER_A: &str = "tz1burnburnburnburnburnburnburjAYjjX";
pub const PROVIDER_B: &str = "tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU";
pub const PROVIDER_C: &str = "tz1MCGdC9qYbSjtWEbup9i17WkohvzwCm2HV";

pub const STAKING_BALANCE: Mutez = 740_613_513_605;
pub const SCENARIO_BALANCE: Mutez = 60_545_965_782;

pub fn head(level: u64, cycle: u32) -> BlockHeader {
    BlockHeader {
        hash: format!("BLockHead{level}"),
        level,
        cycle,
    }
}

/// Snapshot whose full reward pool is 446,351,790 mutez (431,351,790 earnings only).
pub fn snapshot(delegators: Vec<Recipient>) -> RewardSnapshot {
    RewardSnapshot {
        cycle: 300,
        staking_balance: STAKING_BALANCE,
        delegated_balance: delegators.iter().map(|d| d.balance).sum(),
        num_delegators: delegators.len() as u32,
        own_blocks: 5,
        own_block_rewards: 200_000_000,
        own_block_fees: 1_351_790,
        extra_blocks: 2,
        extra_block_rewards: 50_000_000,
        missed_own_blocks: 1,
        missed_own_block_rewards: 10_000_000,
        endorsements: 90,
        endorsement_rewards: 180_000_000,
        missed_endorsements: 3,
        missed_endorsement_rewards: 5_000_000,
        delegators,
        ..Default::default()
    }
}

pub fn settings(batch_size: usize) -> PayoutSettings {
    PayoutSettings {
        baker: BAKER.to_string(),
        wallet: WALLET.to_string(),
        fee: 0.05,
        batch_size,
        confirmation: ConfirmationSettings {
            poll_interval_secs: 1,
            timeout_secs: 5,
        },
        ..Default::default()
    }
}

pub fn report(cycle: u32) -> PayoutReport {
    PayoutReport {
        cycle,
        baker: BAKER.to_string(),
        wallet: WALLET.to_string(),
        generated_at: Utc::now(),
        dry_run: false,
        fee_rate: 0.05,
        reward_pool: 0,
        snapshot: RewardSnapshot::default(),
        payments: Vec::new(),
        batches: Vec::new(),
        operation_links: Vec::new(),
    }
}

/// Dexter-style pool storage with the given ledger big-map and total liquidity.
pub fn pool_storage(ledger: u64, total: u128) -> Value {
    json!({"prim": "Pair", "args": [
        {"int": ledger.to_string()},
        {"prim": "Pair", "args": [
            {"prim": "Pair", "args": [
                {"prim": "False"},
                {"prim": "Pair", "args": [{"prim": "False"}, {"int": total.to_string()}]}
            ]},
            {"prim": "Pair", "args": [
                {"prim": "Pair", "args": [{"string": BAKER}, {"string": "KT1PWx2mnDueood7fEmfbBDKx1D9BAnnXitn"}]},
                {"prim": "Pair", "args": [{"int": "1000"}, {"int": "2000"}]}
            ]}
        ]}
    ]})
}

pub fn ledger_entry(balance: u128) -> Value {
    json!({"prim": "Pair", "args": [{"int": balance.to_string()}, []]})
}

pub fn add_liquidity(hash: &str, level: u64, sender: &str) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        level,
        sender: sender.to_string(),
        target: POOL.to_string(),
        entrypoint: Some("addLiquidity".to_string()),
    }
}
