use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clients::{ChainClient, CyclePayout, IndexerClient};
use crate::config::PayoutSettings;
use crate::models::payout::{Batch, BatchReport, BatchStatus, PayoutReport, ResumePoint};
use crate::services::{
    batcher::{batch_payments, flatten_payments},
    calculator::RewardCalculator,
    liquidity::LiquidityResolver,
    operation::{ForgedOperation, OperationBuilder, TransferLimits},
    submitter::Submitter,
};
use crate::utils::errors::PayoutError;

/// Computes and executes the payout of a cycle.
///
/// Stages run strictly in order: rewards, pool resolution, batching, then one
/// forge/sign/inject/confirm round per batch. The wallet counter is read once
/// per execution and threaded through the batches. A cycle that stopped
/// partway is resumed from its first unpaid batch with a fresh counter.
pub struct PayoutEngine {
    chain: Arc<dyn ChainClient>,
    indexer: Arc<dyn IndexerClient>,
    settings: PayoutSettings,
    calculator: RewardCalculator,
    resolver: LiquidityResolver,
    builder: OperationBuilder,
    submitter: Submitter,
}

impl PayoutEngine {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        indexer: Arc<dyn IndexerClient>,
        settings: PayoutSettings,
    ) -> Result<Self, PayoutError> {
        settings.check()?;

        let calculator = RewardCalculator::new(
            settings.fee,
            settings.earnings_only,
            settings.blacklist.iter().cloned(),
        );
        let resolver = LiquidityResolver::new(
            chain.clone(),
            indexer.clone(),
            settings.liquidity_contracts.iter().cloned(),
            calculator.clone(),
            settings.resolver_concurrency,
        );
        let builder = OperationBuilder::new(
            chain.clone(),
            settings.wallet.clone(),
            TransferLimits {
                fee: settings.network_fee,
                gas_limit: settings.gas_limit,
                storage_limit: settings.storage_limit,
            },
        );
        let submitter = Submitter::new(
            chain.clone(),
            settings.signer_key(),
            settings.confirmation.poll_interval(),
            settings.confirmation.timeout(),
        );

        Ok(Self {
            chain,
            indexer,
            settings,
            calculator,
            resolver,
            builder,
            submitter,
        })
    }

    pub fn settings(&self) -> &PayoutSettings {
        &self.settings
    }

    /// Computes rewards and batches without submitting anything.
    pub async fn compute(&self, cycle: u32) -> Result<PayoutReport> {
        let (report, _) = self
            .prepare(cycle)
            .await
            .with_context(|| format!("failed to compute payout for cycle {cycle}"))?;
        Ok(report)
    }

    /// Computes the payout and submits every batch.
    pub async fn execute(&self, cycle: u32) -> Result<PayoutReport> {
        self.resume(cycle, ResumePoint::default()).await
    }

    /// Recomputes the payout and submits only the batches from `from` on.
    ///
    /// Batches before `from.batch` are reported as `PaidEarlier`. When
    /// `from.pending_counter` is set and the wallet counter already reached
    /// it, the batch at `from.batch` landed late and is not sent again.
    pub async fn resume(&self, cycle: u32, from: ResumePoint) -> Result<PayoutReport> {
        self.run(cycle, from)
            .await
            .with_context(|| format!("failed to execute payout for cycle {cycle}"))
    }

    async fn prepare(&self, cycle: u32) -> Result<(PayoutReport, Vec<Batch>)> {
        let mut snapshot = self
            .indexer
            .reward_split(&self.settings.baker, cycle)
            .await
            .context("failed to fetch reward split")?;
        snapshot.cycle = cycle;
        snapshot.validate()?;

        let reward_pool = snapshot.reward_pool(self.settings.earnings_only);
        let annotated = self.calculator.calculate(&snapshot);
        info!(
            cycle,
            delegators = annotated.delegators.len(),
            reward_pool,
            "computed delegator rewards"
        );

        let annotated = if annotated
            .delegators
            .iter()
            .any(|r| self.resolver.is_pool(&r.address))
        {
            let info = self
                .indexer
                .cycle_info(cycle)
                .await
                .context("failed to fetch cycle info")?;
            self.resolver.resolve_all(info.snapshot_level, annotated).await?
        } else {
            annotated
        };

        let payments = flatten_payments(&annotated, self.settings.minimum_payment);
        let batches = batch_payments(&payments, self.settings.batch_size)?;
        info!(
            cycle,
            payments = payments.len(),
            batches = batches.len(),
            "grouped payments into batches"
        );

        let report = PayoutReport {
            cycle,
            baker: self.settings.baker.clone(),
            wallet: self.settings.wallet.clone(),
            generated_at: Utc::now(),
            dry_run: true,
            fee_rate: self.settings.fee,
            reward_pool,
            snapshot: annotated,
            payments,
            batches: batches
                .iter()
                .map(|b| BatchReport::new(b, BatchStatus::Pending))
                .collect(),
            operation_links: Vec::new(),
        };

        Ok((report, batches))
    }

    async fn run(&self, cycle: u32, from: ResumePoint) -> Result<PayoutReport> {
        let (mut report, batches) = self.prepare(cycle).await?;
        report.dry_run = false;

        if from.batch > batches.len() {
            anyhow::bail!(
                "cannot resume from batch {}, the cycle has {} batches",
                from.batch,
                batches.len()
            );
        }
        for entry in &mut report.batches[..from.batch] {
            entry.status = BatchStatus::PaidEarlier;
        }

        if batches.len() == from.batch {
            info!(cycle, "nothing to pay");
            return Ok(report);
        }

        let head = self
            .chain
            .current_block_header()
            .await
            .context("failed to fetch head block")?;

        let mut counter = self
            .chain
            .account_counter(&head.hash, &self.settings.wallet)
            .await
            .with_context(|| format!("failed to fetch counter of {}", self.settings.wallet))?;

        let mut start = from.batch;
        if let Some(pending) = from.pending_counter {
            if counter >= pending {
                info!(cycle, batch = start, counter, "unconfirmed batch landed after all");
                report.batches[start].status = BatchStatus::PaidEarlier;
                start += 1;
            }
        }
        if start > 0 {
            info!(cycle, from_batch = start, batches = batches.len(), "resuming payout");
        }

        self.check_balance(&head.hash, &batches[start..]).await?;

        let mut halted = false;
        for (batch, entry) in batches
            .iter()
            .zip(report.batches.iter_mut())
            .skip(start)
        {
            if halted {
                entry.status = BatchStatus::Skipped;
                continue;
            }

            match self.forge_and_submit(counter, batch).await {
                Ok(Some((operation, hash))) => {
                    entry.first_counter = operation.first_counter();
                    entry.last_counter = Some(operation.last_counter);
                    entry.operation_hash = Some(hash.clone());
                    report.operation_links.push(self.link(&hash));

                    if self.submitter.confirm(&hash).await {
                        entry.status = BatchStatus::Confirmed;
                        counter = operation.last_counter;
                    } else {
                        entry.status = BatchStatus::Unconfirmed;
                        halted = true;
                    }
                }
                Ok(None) => {
                    debug!(cycle, batch = batch.index, "empty batch, nothing to submit");
                    entry.status = BatchStatus::Confirmed;
                }
                Err(err) => {
                    error!(cycle, batch = batch.index, error = ?err, "batch submission failed");
                    entry.status = BatchStatus::Failed {
                        reason: format!("{err:#}"),
                    };
                    halted = true;
                }
            }
        }

        if halted {
            warn!(
                cycle,
                confirmed = report.confirmed_batches(),
                batches = report.batches.len(),
                "payout stopped after a batch did not land; remaining batches skipped"
            );
        } else {
            info!(cycle, batches = report.batches.len(), "payout complete");
        }

        Ok(report)
    }

    async fn forge_and_submit(&self, counter: u64, batch: &Batch) -> Result<Option<(ForgedOperation, String)>> {
        let head = self
            .chain
            .current_block_header()
            .await
            .context("failed to fetch branch")?;

        let operation = match self.builder.build(&head.hash, counter, batch).await? {
            Some(operation) => operation,
            None => return Ok(None),
        };
        let hash = self.submitter.submit(&operation).await?;

        Ok(Some((operation, hash)))
    }

    async fn check_balance(&self, block: &str, batches: &[Batch]) -> Result<()> {
        let required = batches
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(self.builder.cost(b)));
        let available = self
            .chain
            .account_balance(block, &self.settings.wallet)
            .await
            .with_context(|| format!("failed to fetch balance of {}", self.settings.wallet))?;

        if available < required {
            return Err(PayoutError::InsufficientBalance {
                wallet: self.settings.wallet.clone(),
                required,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn link(&self, hash: &str) -> String {
        format!("{}/{}", self.settings.explorer_url.trim_end_matches('/'), hash)
    }
}

#[async_trait]
impl CyclePayout for PayoutEngine {
    async fn execute(&self, cycle: u32, from: ResumePoint) -> Result<PayoutReport> {
        self.resume(cycle, from).await
    }
}
