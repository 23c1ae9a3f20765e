use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::reward::{Mutez, RewardSnapshot};

/// A single transfer owed to a delegator or liquidity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub destination: String,
    pub amount: Mutez,
    /// Pool contract the reward was earned through, for liquidity providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

/// Ordered slice of payments submitted as one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub payments: Vec<Payment>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    pub fn total(&self) -> Mutez {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub source: String,
    pub destination: String,
    pub amount: Mutez,
    pub fee: Mutez,
    pub gas_limit: u64,
    pub storage_limit: u64,
    pub counter: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// Computed but not submitted (dry run).
    Pending,
    Confirmed,
    /// Injected but not seen in a block before the confirmation timeout.
    Unconfirmed,
    Failed { reason: String },
    /// Not submitted because an earlier batch of the cycle did not land.
    Skipped,
    /// Landed during an earlier attempt at the same cycle.
    PaidEarlier,
}

impl BatchStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, BatchStatus::Confirmed | BatchStatus::PaidEarlier)
    }
}

/// Where a cycle's payout picks up after an earlier attempt stopped partway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// First batch that was not confirmed.
    pub batch: usize,
    /// Last counter of that batch when it was injected but never seen in a block.
    /// A wallet counter at or past it means the batch landed after all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_counter: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub index: usize,
    pub payments: Vec<Payment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_counter: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_counter: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_hash: Option<String>,
    #[serde(flatten)]
    pub status: BatchStatus,
}

impl BatchReport {
    pub fn new(batch: &Batch, status: BatchStatus) -> Self {
        Self {
            index: batch.index,
            payments: batch.payments.clone(),
            first_counter: None,
            last_counter: None,
            operation_hash: None,
            status,
        }
    }
}

/// Outcome of computing (and possibly executing) the payout of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReport {
    pub cycle: u32,
    pub baker: String,
    pub wallet: String,
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub fee_rate: f64,
    pub reward_pool: Mutez,
    pub snapshot: RewardSnapshot,
    pub payments: Vec<Payment>,
    pub batches: Vec<BatchReport>,
    pub operation_links: Vec<String>,
}

impl PayoutReport {
    pub fn total_paid(&self) -> Mutez {
        self.payments.iter().map(|p| p.amount).sum()
    }

    pub fn confirmed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status.is_paid())
            .count()
    }

    /// True when every batch landed on chain.
    pub fn is_complete(&self) -> bool {
        self.batches.iter().all(|b| b.status.is_paid())
    }

    /// The point to pick up from when some batch did not land, `None` once complete.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        let stopped = self.batches.iter().find(|b| !b.status.is_paid())?;
        let pending_counter = match stopped.status {
            BatchStatus::Unconfirmed => stopped.last_counter,
            _ => None,
        };

        Some(ResumePoint {
            batch: stopped.index,
            pending_counter,
        })
    }
}
