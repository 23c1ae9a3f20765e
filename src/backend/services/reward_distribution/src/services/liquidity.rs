use anyhow::{Context, Result};
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info};

use crate::clients::{ChainClient, IndexerClient};
use crate::models::{
    chain::TransactionFilter,
    reward::{Earnings, LiquidityProvider, Recipient, RewardSnapshot},
};
use crate::services::calculator::RewardCalculator;
use crate::utils::{errors::PayoutError, micheline::MichelineUtils};

/// Entrypoint whose callers are treated as the pool's liquidity providers.
pub const ADD_LIQUIDITY_ENTRYPOINT: &str = "addLiquidity";

/// Ledger pointer and total supply read from a pool contract's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStorage {
    pub ledger: u64,
    pub total_liquidity: u128,
}

impl PoolStorage {
    /// Reads a dexter-style storage:
    /// `Pair ledger (Pair (Pair updating (Pair freeze lqtTotal)) ...)`.
    pub fn parse(contract: &str, storage: &Value) -> Result<Self, PayoutError> {
        let malformed = |reason: &str| PayoutError::MalformedStorage {
            contract: contract.to_string(),
            reason: reason.to_string(),
        };

        let fields = MichelineUtils::flatten_pair(storage);
        let ledger = fields
            .first()
            .and_then(|v| MichelineUtils::int(v))
            .ok_or_else(|| malformed("missing ledger big-map id"))?;
        let ledger = u64::try_from(ledger).map_err(|_| malformed("ledger big-map id out of range"))?;

        let flags = fields
            .get(1)
            .map(|v| MichelineUtils::flatten_pair(v))
            .ok_or_else(|| malformed("missing liquidity totals"))?;
        let total_liquidity = flags
            .get(2)
            .and_then(|v| MichelineUtils::int(v))
            .ok_or_else(|| malformed("missing total liquidity"))?;

        Ok(Self {
            ledger,
            total_liquidity,
        })
    }
}

/// Reads a ledger value, either `Pair balance allowances` or a bare balance.
pub fn parse_ledger_balance(contract: &str, entry: &Value) -> Result<u128, PayoutError> {
    MichelineUtils::flatten_pair(entry)
        .first()
        .and_then(|v| MichelineUtils::int(v))
        .ok_or_else(|| PayoutError::MalformedStorage {
            contract: contract.to_string(),
            reason: "ledger entry has no balance".to_string(),
        })
}

/// Expands pool contracts among the delegators into their liquidity providers.
///
/// Providers are discovered from historical `addLiquidity` calls, so an
/// address that later withdrew is still looked up; a missing or empty ledger
/// entry is how such addresses drop out.
pub struct LiquidityResolver {
    chain: Arc<dyn ChainClient>,
    indexer: Arc<dyn IndexerClient>,
    contracts: HashSet<String>,
    calculator: RewardCalculator,
    concurrency: usize,
}

impl LiquidityResolver {
    pub fn new<I>(
        chain: Arc<dyn ChainClient>,
        indexer: Arc<dyn IndexerClient>,
        contracts: I,
        calculator: RewardCalculator,
        concurrency: usize,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            chain,
            indexer,
            contracts: contracts.into_iter().collect(),
            calculator,
            concurrency: concurrency.max(1),
        }
    }

    pub fn is_pool(&self, address: &str) -> bool {
        self.contracts.contains(address)
    }

    /// Resolves every pool contract in an annotated snapshot at the given level.
    pub async fn resolve_all(&self, level: u64, mut snapshot: RewardSnapshot) -> Result<RewardSnapshot> {
        for recipient in snapshot.delegators.iter_mut() {
            if !self.is_pool(&recipient.address) {
                continue;
            }
            let providers = self.resolve(level, recipient).await?;
            recipient.liquidity_providers = providers;
        }

        Ok(snapshot)
    }

    /// Liquidity providers of one pool, with rewards derived from the pool's net reward.
    pub async fn resolve(&self, level: u64, recipient: &Recipient) -> Result<Vec<LiquidityProvider>> {
        self.resolve_contract(level, recipient)
            .await
            .with_context(|| format!("failed to resolve liquidity providers of {}", recipient.address))
    }

    async fn resolve_contract(&self, level: u64, recipient: &Recipient) -> Result<Vec<LiquidityProvider>> {
        let contract = recipient.address.as_str();
        let block = level.to_string();

        let storage = self
            .chain
            .contract_storage(&block, contract)
            .await
            .context("failed to fetch contract storage")?;
        let pool = PoolStorage::parse(contract, &storage)?;

        if pool.total_liquidity == 0 {
            debug!(contract, "pool has no liquidity");
            return Ok(Vec::new());
        }

        let candidates = self.candidates(contract, level).await?;
        let block = block.as_str();
        let balances: Vec<(String, u128)> = stream::iter(candidates)
            .map(|address| async move {
                let balance = self.ledger_balance(block, contract, pool.ledger, &address).await?;
                Ok::<_, anyhow::Error>((address, balance))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let providers: Vec<_> = balances
            .into_iter()
            .filter(|(_, balance)| *balance > 0)
            .map(|(address, balance)| {
                let share = balance as f64 / pool.total_liquidity as f64;
                let earnings = Earnings::from_share(share, recipient.net_reward, self.calculator.fee());

                LiquidityProvider {
                    blacklisted: self.calculator.is_blacklisted(&address),
                    address,
                    balance,
                    share,
                    gross_reward: earnings.gross,
                    fee: earnings.fee,
                    net_reward: earnings.net,
                }
            })
            .collect();

        info!(
            contract,
            level,
            providers = providers.len(),
            total_liquidity = %pool.total_liquidity,
            "resolved liquidity providers"
        );
        Ok(providers)
    }

    /// Distinct senders of `addLiquidity` up to `level`, in first-seen order.
    async fn candidates(&self, contract: &str, level: u64) -> Result<Vec<String>> {
        let filter = TransactionFilter::calls_to(contract, ADD_LIQUIDITY_ENTRYPOINT).up_to_level(level);
        let transactions = self
            .indexer
            .search_transactions(&filter)
            .await
            .context("failed to search liquidity transactions")?;

        let mut seen = HashSet::new();
        Ok(transactions
            .into_iter()
            .map(|tx| tx.sender)
            .filter(|sender| seen.insert(sender.clone()))
            .collect())
    }

    async fn ledger_balance(&self, block: &str, contract: &str, ledger: u64, address: &str) -> Result<u128> {
        let key = MichelineUtils::script_expr_hash(address)?;
        let entry = self
            .chain
            .big_map_entry(block, ledger, &key)
            .await
            .with_context(|| format!("failed to read ledger entry of {address}"))?;

        match entry {
            Some(value) => Ok(parse_ledger_balance(contract, &value)?),
            None => Ok(0),
        }
    }
}
