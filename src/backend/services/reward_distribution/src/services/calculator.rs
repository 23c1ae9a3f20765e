use std::collections::HashSet;

use crate::models::reward::{Earnings, RewardSnapshot};

/// Splits a baker's cycle rewards between its delegators.
#[derive(Debug, Clone)]
pub struct RewardCalculator {
    fee: f64,
    earnings_only: bool,
    blacklist: HashSet<String>,
}

impl RewardCalculator {
    pub fn new<I>(fee: f64, earnings_only: bool, blacklist: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            fee,
            earnings_only,
            blacklist: blacklist.into_iter().collect(),
        }
    }

    pub fn fee(&self) -> f64 {
        self.fee
    }

    pub fn is_blacklisted(&self, address: &str) -> bool {
        self.blacklist.contains(address)
    }

    /// Returns a copy of the snapshot with every delegator's share and reward filled in.
    ///
    /// The snapshot must have passed [`RewardSnapshot::validate`].
    pub fn calculate(&self, snapshot: &RewardSnapshot) -> RewardSnapshot {
        debug_assert!(snapshot.staking_balance > 0);

        let pool = snapshot.reward_pool(self.earnings_only);
        let staking_balance = snapshot.staking_balance as f64;

        let mut annotated = snapshot.clone();
        for recipient in annotated.delegators.iter_mut() {
            let share = recipient.balance as f64 / staking_balance;
            let earnings = Earnings::from_share(share, pool, self.fee);

            recipient.share = share;
            recipient.gross_reward = earnings.gross;
            recipient.fee = earnings.fee;
            recipient.net_reward = earnings.net;
            recipient.blacklisted = self.is_blacklisted(&recipient.address);
        }

        annotated
    }
}
