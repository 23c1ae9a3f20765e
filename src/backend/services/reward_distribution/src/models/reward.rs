use serde::{Deserialize, Serialize};

use crate::utils::errors::PayoutError;

/// Smallest on-chain unit (1 tez = 1_000_000 mutez).
pub type Mutez = u64;

/// Reward and delegation snapshot for one (baker, cycle), as reported by the indexer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewardSnapshot {
    pub cycle: u32,
    pub staking_balance: Mutez,
    pub delegated_balance: Mutez,
    pub num_delegators: u32,

    pub own_blocks: u32,
    pub own_block_rewards: Mutez,
    pub own_block_fees: Mutez,
    pub extra_blocks: u32,
    pub extra_block_rewards: Mutez,
    pub extra_block_fees: Mutez,

    pub missed_own_blocks: u32,
    pub missed_own_block_rewards: Mutez,
    pub missed_own_block_fees: Mutez,
    pub missed_extra_blocks: u32,
    pub missed_extra_block_rewards: Mutez,
    pub missed_extra_block_fees: Mutez,

    pub endorsements: u32,
    pub endorsement_rewards: Mutez,
    pub missed_endorsements: u32,
    pub missed_endorsement_rewards: Mutez,

    pub revelations: u32,
    pub revelation_rewards: Mutez,

    pub delegators: Vec<Recipient>,
}

impl RewardSnapshot {
    /// Total rewards to split between delegators.
    ///
    /// With `earnings_only` the missed categories are left out, so delegators
    /// only share what the baker actually earned.
    pub fn reward_pool(&self, earnings_only: bool) -> Mutez {
        let earned = [
            self.endorsement_rewards,
            self.revelation_rewards,
            self.own_block_rewards,
            self.own_block_fees,
            self.extra_block_rewards,
            self.extra_block_fees,
        ];
        let missed = [
            self.missed_own_block_rewards,
            self.missed_own_block_fees,
            self.missed_extra_block_rewards,
            self.missed_extra_block_fees,
            self.missed_endorsement_rewards,
        ];

        let total = earned.iter().fold(0u64, |acc, v| acc.saturating_add(*v));
        if earnings_only {
            total
        } else {
            missed.iter().fold(total, |acc, v| acc.saturating_add(*v))
        }
    }

    /// Checks the preconditions the calculator relies on.
    pub fn validate(&self) -> Result<(), PayoutError> {
        if self.staking_balance == 0 {
            return Err(PayoutError::InvalidSnapshot {
                cycle: self.cycle,
                reason: "staking balance is zero".to_string(),
            });
        }

        if let Some(recipient) = self
            .delegators
            .iter()
            .find(|r| r.balance > self.staking_balance)
        {
            return Err(PayoutError::InvalidSnapshot {
                cycle: self.cycle,
                reason: format!(
                    "delegator {} balance {} exceeds staking balance {}",
                    recipient.address, recipient.balance, self.staking_balance
                ),
            });
        }

        Ok(())
    }
}

/// A delegator of the baker and its computed reward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub address: String,
    pub balance: Mutez,
    #[serde(default)]
    pub share: f64,
    #[serde(default)]
    pub gross_reward: Mutez,
    #[serde(default)]
    pub fee: Mutez,
    #[serde(default)]
    pub net_reward: Mutez,
    #[serde(default)]
    pub blacklisted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub liquidity_providers: Vec<LiquidityProvider>,
}

impl Recipient {
    pub fn new(address: impl Into<String>, balance: Mutez) -> Self {
        Self {
            address: address.into(),
            balance,
            ..Default::default()
        }
    }
}

/// Participant of a liquidity pool contract that delegates to the baker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityProvider {
    pub address: String,
    /// Pool units held, as recorded in the contract ledger.
    pub balance: u128,
    pub share: f64,
    pub gross_reward: Mutez,
    pub fee: Mutez,
    pub net_reward: Mutez,
    pub blacklisted: bool,
}

/// Gross reward split into operator fee and net payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Earnings {
    pub gross: Mutez,
    pub fee: Mutez,
    pub net: Mutez,
}

impl Earnings {
    /// `gross = floor(share * pool)`, `fee = floor(fee_rate * gross)`, `net = gross - fee`.
    pub fn from_share(share: f64, pool: Mutez, fee_rate: f64) -> Self {
        let gross = (share * pool as f64).floor() as Mutez;
        let fee = ((fee_rate * gross as f64).floor() as Mutez).min(gross);

        Self {
            gross,
            fee,
            net: gross - fee,
        }
    }
}
