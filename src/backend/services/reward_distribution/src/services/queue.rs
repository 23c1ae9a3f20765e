use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{CyclePayout, Notifier};
use crate::models::payout::{PayoutReport, ResumePoint};

/// A cycle waiting to be paid, together with whatever pays it.
#[derive(Clone)]
pub struct PayoutJob {
    pub id: Uuid,
    pub cycle: u32,
    pub attempts: u32,
    /// First batch still owed, past the batches earlier attempts landed.
    pub resume: ResumePoint,
    payout: Arc<dyn CyclePayout>,
}

impl PayoutJob {
    pub fn new(cycle: u32, payout: Arc<dyn CyclePayout>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cycle,
            attempts: 0,
            resume: ResumePoint::default(),
            payout,
        }
    }
}

impl fmt::Debug for PayoutJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayoutJob")
            .field("id", &self.id)
            .field("cycle", &self.cycle)
            .field("attempts", &self.attempts)
            .field("resume", &self.resume)
            .finish_non_exhaustive()
    }
}

/// What happened to the job processed on a tick.
#[derive(Debug)]
pub enum JobOutcome {
    Paid(PayoutReport),
    /// Some batches landed but the rest did not. The job went back to the
    /// tail and resumes at `resume`.
    Partial {
        report: PayoutReport,
        resume: ResumePoint,
    },
    /// The job failed and was put back at the tail of the queue.
    Requeued { cycle: u32, attempts: u32 },
}

/// FIFO of pending cycle payouts, drained one job per tick.
///
/// Failed jobs go back to the tail and are retried without limit. A cycle
/// that stopped partway is retried from its first unpaid batch.
pub struct PayoutQueue {
    jobs: Mutex<VecDeque<PayoutJob>>,
    tick_interval: Duration,
    notifier: Option<Arc<dyn Notifier>>,
}

impl PayoutQueue {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            tick_interval,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn enqueue(&self, job: PayoutJob) {
        info!(cycle = job.cycle, job = %job.id, "payout job queued");
        self.jobs.lock().await.push_back(job);
    }

    pub async fn dequeue(&self) -> Option<PayoutJob> {
        self.jobs.lock().await.pop_front()
    }

    /// Cycle of the job that will run next.
    pub async fn front_cycle(&self) -> Option<u32> {
        self.jobs.lock().await.front().map(|job| job.cycle)
    }

    pub async fn contains(&self, cycle: u32) -> bool {
        self.jobs.lock().await.iter().any(|job| job.cycle == cycle)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Runs the front job, if any. The lock is not held while the job executes.
    pub async fn process_next(&self) -> Option<JobOutcome> {
        let mut job = self.dequeue().await?;
        job.attempts += 1;

        match job.payout.execute(job.cycle, job.resume).await {
            Ok(report) => {
                info!(
                    cycle = report.cycle,
                    job = %job.id,
                    attempts = job.attempts,
                    payments = report.payments.len(),
                    total_paid = report.total_paid(),
                    confirmed_batches = report.confirmed_batches(),
                    batches = report.batches.len(),
                    links = ?report.operation_links,
                    "payout job finished"
                );

                if let Some(notifier) = &self.notifier {
                    if let Err(err) = notifier.notify(&report).await {
                        warn!(cycle = report.cycle, error = ?err, "failed to send payout notification");
                    }
                }

                match report.resume_point() {
                    None => Some(JobOutcome::Paid(report)),
                    Some(resume) => {
                        warn!(
                            cycle = report.cycle,
                            job = %job.id,
                            from_batch = resume.batch,
                            pending_counter = ?resume.pending_counter,
                            "payout stopped partway, requeueing remaining batches"
                        );
                        job.resume = resume;
                        self.jobs.lock().await.push_back(job);
                        Some(JobOutcome::Partial { report, resume })
                    }
                }
            }
            Err(err) => {
                error!(
                    cycle = job.cycle,
                    job = %job.id,
                    attempts = job.attempts,
                    error = ?err,
                    "payout job failed, requeueing"
                );
                let outcome = JobOutcome::Requeued {
                    cycle: job.cycle,
                    attempts: job.attempts,
                };
                self.jobs.lock().await.push_back(job);
                Some(outcome)
            }
        }
    }

    /// Drains the queue on a fixed interval until `shutdown` flips to true.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(tick_secs = self.tick_interval.as_secs(), "payout queue started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.process_next().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            let pending = self.len().await;
            info!(pending, "payout queue stopped");
        })
    }
}
