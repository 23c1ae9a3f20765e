use anyhow::{Context, Result};
use reward_distribution::{
    clients::{
        http::{NodeClient, TzktClient, WebhookNotifier},
        ChainClient, CyclePayout, IndexerClient,
    },
    models::payout::{BatchStatus, PayoutReport, ResumePoint},
    services::{CycleWatcher, PayoutEngine, PayoutQueue},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use url::Url;

use crate::config::Config;

/// Commands for payout operations
pub struct PayoutCommands {
    config: Config,
    chain: Arc<dyn ChainClient>,
    engine: Arc<PayoutEngine>,
}

impl PayoutCommands {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let chain: Arc<dyn ChainClient> = Arc::new(NodeClient::new(
            &config.network.node_url,
            &config.network.signer_url,
        )?);
        let indexer: Arc<dyn IndexerClient> = Arc::new(TzktClient::new(&config.network.indexer_url)?);
        let engine = Arc::new(PayoutEngine::new(chain.clone(), indexer, config.payout.clone())?);

        Ok(Self {
            config,
            chain,
            engine,
        })
    }

    /// Compute a cycle's payout without submitting anything
    pub async fn dry_run(&self, cycle: Option<u32>, json: bool) -> Result<()> {
        let cycle = self.resolve_cycle(cycle).await?;
        let report = self.engine.compute(cycle).await?;
        print_report(&report, json)
    }

    /// Compute and submit a cycle's payout, starting at `from` for a partly paid cycle
    pub async fn run(&self, cycle: Option<u32>, from: ResumePoint, json: bool) -> Result<()> {
        let cycle = self.resolve_cycle(cycle).await?;
        let report = self.engine.resume(cycle, from).await?;
        print_report(&report, json)?;

        if let Some(resume) = report.resume_point() {
            let pending = resume
                .pending_counter
                .map(|c| format!(" --pending-counter {c}"))
                .unwrap_or_default();
            anyhow::bail!(
                "payout of cycle {} incomplete: {}/{} batches confirmed, resume with `run --cycle {} --from-batch {}{}`",
                cycle,
                report.confirmed_batches(),
                report.batches.len(),
                cycle,
                resume.batch,
                pending
            );
        }
        Ok(())
    }

    /// Watch for new cycles and pay them until interrupted
    pub async fn serve(&self) -> Result<()> {
        let service = &self.config.service;

        let mut queue = PayoutQueue::new(service.tick_interval());
        if let Some(notify_url) = &self.config.network.notify_url {
            queue = queue.with_notifier(Arc::new(WebhookNotifier::new(Url::parse(notify_url)?)));
        }
        let queue = Arc::new(queue);

        let payout: Arc<dyn CyclePayout> = self.engine.clone();
        let watcher = CycleWatcher::new(
            self.chain.clone(),
            queue.clone(),
            payout,
            service.cycle_poll_interval(),
            service.cycle_offset,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue_task = queue.clone().start(shutdown_rx.clone());
        let watcher_task = tokio::spawn(watcher.run(shutdown_rx));

        info!(
            baker = %self.config.payout.baker,
            wallet = %self.config.payout.wallet,
            cycle_offset = service.cycle_offset,
            "payout service running"
        );

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutting down");
        shutdown_tx.send(true).ok();

        queue_task.await?;
        watcher_task.await?;
        Ok(())
    }

    /// Explicit cycle, or the last cycle old enough to pay.
    async fn resolve_cycle(&self, cycle: Option<u32>) -> Result<u32> {
        if let Some(cycle) = cycle {
            return Ok(cycle);
        }

        let head = self
            .chain
            .current_block_header()
            .await
            .context("failed to fetch head block")?;
        let offset = self.config.service.cycle_offset;
        head.cycle
            .checked_sub(offset)
            .with_context(|| format!("head cycle {} is younger than the offset {offset}", head.cycle))
    }
}

fn print_report(report: &PayoutReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "Cycle {} payout from {} ({})",
        report.cycle,
        report.wallet,
        if report.dry_run { "dry run" } else { "executed" }
    );
    println!("Reward pool: {} mutez, fee rate {}", report.reward_pool, report.fee_rate);
    println!();
    println!("{:<38} {:>16} {:>14} {:>16}", "Address", "Gross", "Fee", "Net");
    for recipient in &report.snapshot.delegators {
        let marker = if recipient.blacklisted { " (blacklisted)" } else { "" };
        println!(
            "{:<38} {:>16} {:>14} {:>16}{}",
            recipient.address, recipient.gross_reward, recipient.fee, recipient.net_reward, marker
        );
        for provider in &recipient.liquidity_providers {
            println!(
                "  {:<36} {:>16} {:>14} {:>16}",
                provider.address, provider.gross_reward, provider.fee, provider.net_reward
            );
        }
    }

    println!();
    println!(
        "{} payments, {} mutez in {} batches",
        report.payments.len(),
        report.total_paid(),
        report.batches.len()
    );
    for batch in &report.batches {
        let status = match &batch.status {
            BatchStatus::Pending => "pending".to_string(),
            BatchStatus::Confirmed => "confirmed".to_string(),
            BatchStatus::Unconfirmed => "unconfirmed".to_string(),
            BatchStatus::Failed { reason } => format!("failed: {reason}"),
            BatchStatus::Skipped => "skipped".to_string(),
            BatchStatus::PaidEarlier => "paid earlier".to_string(),
        };
        println!(
            "  batch {}: {} transfers, {} {}",
            batch.index,
            batch.payments.len(),
            status,
            batch.operation_hash.as_deref().unwrap_or("")
        );
    }
    for link in &report.operation_links {
        println!("  {link}");
    }

    Ok(())
}
