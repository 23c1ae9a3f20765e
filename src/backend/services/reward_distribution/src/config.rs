use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::models::reward::Mutez;
use crate::utils::errors::PayoutError;

/// Everything the payout engine needs to know about the baker and its policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PayoutSettings {
    /// Baker whose delegators are paid.
    #[validate(length(min = 1))]
    pub baker: String,
    /// Account the payments are sent from.
    #[validate(length(min = 1))]
    pub wallet: String,
    /// Key identifier handed to the signer, defaults to the wallet address.
    pub signer_key: Option<String>,
    /// Operator fee rate, between 0 and 1.
    #[validate(range(min = 0.0, max = 1.0))]
    pub fee: f64,
    /// Net payments below this amount are skipped.
    pub minimum_payment: Mutez,
    #[validate(range(min = 1))]
    pub batch_size: usize,
    pub earnings_only: bool,
    pub blacklist: Vec<String>,
    /// Pool contracts whose rewards are forwarded to their liquidity providers.
    pub liquidity_contracts: Vec<String>,
    /// Parallel ledger lookups while resolving a pool.
    #[validate(range(min = 1))]
    pub resolver_concurrency: usize,
    pub network_fee: Mutez,
    pub gas_limit: u64,
    pub storage_limit: u64,
    /// Prefix for operation links in reports.
    pub explorer_url: String,
    #[validate]
    pub confirmation: ConfirmationSettings,
}

impl Default for PayoutSettings {
    fn default() -> Self {
        Self {
            baker: String::new(),
            wallet: String::new(),
            signer_key: None,
            fee: 0.05,
            minimum_payment: 0,
            batch_size: 125,
            earnings_only: false,
            blacklist: Vec::new(),
            liquidity_contracts: Vec::new(),
            resolver_concurrency: 10,
            network_fee: 2941,
            gas_limit: 26283,
            storage_limit: 300,
            explorer_url: "https://tzkt.io".to_string(),
            confirmation: ConfirmationSettings::default(),
        }
    }
}

impl PayoutSettings {
    pub fn signer_key(&self) -> &str {
        self.signer_key.as_deref().unwrap_or(&self.wallet)
    }

    pub fn check(&self) -> Result<(), PayoutError> {
        // NaN passes the range check.
        if !self.fee.is_finite() {
            return Err(PayoutError::InvalidSettings(format!(
                "fee must be a finite rate, got {}",
                self.fee
            )));
        }
        self.validate()
            .map_err(|e| PayoutError::InvalidSettings(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConfirmationSettings {
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            timeout_secs: 600,
        }
    }
}

impl ConfirmationSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
