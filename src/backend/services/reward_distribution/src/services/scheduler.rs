use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::clients::{ChainClient, CyclePayout};
use crate::services::queue::{PayoutJob, PayoutQueue};

/// Watches the head cycle and queues a payout whenever it advances.
///
/// The first observation only records the current cycle. When the head moves
/// from `previous` to `current`, every cycle in
/// `previous + 1 - cycle_offset ..= current - cycle_offset` is queued oldest
/// first, skipping cycles already waiting in the queue.
pub struct CycleWatcher {
    chain: Arc<dyn ChainClient>,
    queue: Arc<PayoutQueue>,
    payout: Arc<dyn CyclePayout>,
    poll_interval: Duration,
    cycle_offset: u32,
    last_cycle: Option<u32>,
}

impl CycleWatcher {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        queue: Arc<PayoutQueue>,
        payout: Arc<dyn CyclePayout>,
        poll_interval: Duration,
        cycle_offset: u32,
    ) -> Self {
        Self {
            chain,
            queue,
            payout,
            poll_interval,
            cycle_offset,
            last_cycle: None,
        }
    }

    pub fn last_cycle(&self) -> Option<u32> {
        self.last_cycle
    }

    /// Checks the head once. Returns the cycles queued, oldest first.
    pub async fn poll_once(&mut self) -> Result<Vec<u32>> {
        let head = self
            .chain
            .current_block_header()
            .await
            .context("failed to fetch head block")?;

        let previous = match self.last_cycle.replace(head.cycle) {
            Some(previous) => previous,
            None => {
                info!(cycle = head.cycle, level = head.level, "watching cycles");
                return Ok(Vec::new());
            }
        };

        if head.cycle <= previous {
            self.last_cycle = Some(previous);
            return Ok(Vec::new());
        }
        if head.cycle - previous > 1 {
            warn!(
                previous,
                head_cycle = head.cycle,
                "head advanced several cycles between polls"
            );
        }

        let mut queued = Vec::new();
        for ended in previous + 1..=head.cycle {
            let target = match ended.checked_sub(self.cycle_offset) {
                Some(target) => target,
                None => continue,
            };
            if self.queue.contains(target).await {
                debug!(cycle = target, "payout already queued");
                continue;
            }

            info!(head_cycle = head.cycle, cycle = target, "new cycle, queueing payout");
            self.queue
                .enqueue(PayoutJob::new(target, self.payout.clone()))
                .await;
            queued.push(target);
        }

        Ok(queued)
    }

    /// Polls until `shutdown` flips to true. Poll errors are logged and retried.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once().await {
                        warn!(error = ?err, "cycle poll failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(last_cycle = ?self.last_cycle, "cycle watcher stopped");
    }
}
