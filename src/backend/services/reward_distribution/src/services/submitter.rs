use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clients::ChainClient;
use crate::services::operation::ForgedOperation;

/// Signs, injects and waits for inclusion of one operation at a time.
pub struct Submitter {
    chain: Arc<dyn ChainClient>,
    key: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl Submitter {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        key: impl Into<String>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            chain,
            key: key.into(),
            poll_interval,
            timeout,
        }
    }

    /// Signs and injects the operation, returning its hash.
    pub async fn submit(&self, operation: &ForgedOperation) -> Result<String> {
        let signed = self
            .chain
            .sign(&operation.unsigned, &self.key)
            .await
            .context("failed to sign operation")?;

        let hash = self
            .chain
            .inject_operation(&signed)
            .await
            .context("failed to inject operation")?;

        info!(
            operation = %hash,
            transfers = operation.instructions.len(),
            last_counter = operation.last_counter,
            "operation injected"
        );
        Ok(hash)
    }

    /// Polls the chain until `hash` shows up in a block or the timeout elapses.
    ///
    /// Every block from the head seen at the first poll up to the current head
    /// is checked once, so an inclusion is found even after newer blocks
    /// arrived between polls. The first check happens immediately. Returns
    /// `false` on timeout.
    pub async fn confirm(&self, hash: &str) -> bool {
        match time::timeout(self.timeout, self.wait_for_inclusion(hash)).await {
            Ok(()) => {
                info!(operation = %hash, "operation confirmed");
                true
            }
            Err(_) => {
                warn!(
                    operation = %hash,
                    timeout_secs = self.timeout.as_secs(),
                    "operation not confirmed before timeout"
                );
                false
            }
        }
    }

    async fn wait_for_inclusion(&self, hash: &str) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_level = None;

        loop {
            ticker.tick().await;

            match self.scan_new_blocks(hash, &mut next_level).await {
                Ok(true) => return,
                Ok(false) => debug!(operation = %hash, next_level = ?next_level, "operation not yet included"),
                Err(err) => warn!(operation = %hash, error = ?err, "failed to scan blocks"),
            }
        }
    }

    /// Checks blocks from `next_level` (or the head on the first call) up to the head.
    async fn scan_new_blocks(&self, hash: &str, next_level: &mut Option<u64>) -> Result<bool> {
        let head = self
            .chain
            .current_block_header()
            .await
            .context("failed to fetch head block")?;

        for level in next_level.unwrap_or(head.level)..=head.level {
            let passes = self
                .chain
                .included_operation_hashes(&level.to_string())
                .await
                .with_context(|| format!("failed to fetch operations of block {level}"))?;
            if passes.iter().flatten().any(|h| h == hash) {
                debug!(operation = %hash, level, "operation found");
                return Ok(true);
            }
            *next_level = Some(level + 1);
        }

        Ok(false)
    }
}
