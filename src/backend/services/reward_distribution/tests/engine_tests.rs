mod common;

use anyhow::{anyhow, Result};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use common::{
    add_liquidity, head, ledger_entry, pool_storage, settings, snapshot, MockChain, MockIndexer, BAKER,
    POOL, PROVIDER_A, SCENARIO_BALANCE, WALLET,
};
use reward_distribution::{
    clients::CyclePayout,
    config::PayoutSettings,
    models::{
        chain::CycleInfo,
        payout::{BatchStatus, PayoutReport, ResumePoint, TransferInstruction},
        reward::{Mutez, Recipient, RewardSnapshot},
    },
    services::{
        engine::PayoutEngine,
        queue::{JobOutcome, PayoutJob, PayoutQueue},
    },
    utils::errors::PayoutError,
};

const CYCLE: u32 = 300;
const START_COUNTER: u64 = 1_000;

/// Records every forged batch and lets tests decide which injections fail.
#[derive(Default)]
struct Ledger {
    forged: Mutex<Vec<Vec<TransferInstruction>>>,
    injected: Mutex<Vec<String>>,
    /// Highest counter of an operation that made it into a block.
    landed_counter: AtomicU64,
}

impl Ledger {
    fn counters(&self) -> Vec<Vec<u64>> {
        self.forged
            .lock()
            .unwrap()
            .iter()
            .map(|batch| batch.iter().map(|i| i.counter).collect())
            .collect()
    }

    fn destinations(&self) -> Vec<String> {
        self.forged
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|i| i.destination.clone())
            .collect()
    }
}

fn statuses(report: &PayoutReport) -> Vec<BatchStatus> {
    report.batches.iter().map(|b| b.status.clone()).collect()
}

fn five_delegators() -> RewardSnapshot {
    snapshot(vec![
        Recipient::new("tz1delegator0", SCENARIO_BALANCE),
        Recipient::new("tz1delegator1", 100_000_000_000),
        Recipient::new("tz1delegator2", 250_000_000_000),
        Recipient::new("tz1delegator3", 100_000_000_000),
        Recipient::new("tz1delegator4", 100_000_000_000),
    ])
}

fn indexer_with(split: RewardSnapshot) -> MockIndexer {
    let mut indexer = MockIndexer::new();
    indexer
        .expect_reward_split()
        .withf(|baker, cycle| baker == BAKER && *cycle == CYCLE)
        .returning(move |_, _| Ok(split.clone()));
    indexer
}

/// Chain that accepts everything; `fail_injection` picks injection attempts (0-based) that error.
fn chain_with(ledger: Arc<Ledger>, fail_injection: Option<usize>, include: bool) -> MockChain {
    let mut chain = MockChain::new();
    chain
        .expect_current_block_header()
        .returning(|| Ok(head(1_600_000, CYCLE + 1)));
    chain
        .expect_account_balance()
        .withf(|_, address| address == WALLET)
        .returning(|_, _| Ok(100_000_000_000));
    let counters = ledger.clone();
    chain
        .expect_account_counter()
        .withf(|_, address| address == WALLET)
        .returning(move |_, _| Ok(START_COUNTER.max(counters.landed_counter.load(Ordering::SeqCst))));

    let forged = ledger.clone();
    chain
        .expect_forge_operation()
        .returning(move |_, contents| {
            let mut batches = forged.forged.lock().unwrap();
            batches.push(contents.to_vec());
            Ok(format!("unsigned{}", batches.len()))
        });
    chain
        .expect_sign()
        .returning(|unsigned, _| Ok(format!("{unsigned}signed")));

    let attempts = Arc::new(AtomicUsize::new(0));
    let injected = ledger.clone();
    chain.expect_inject_operation().returning(move |signed| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        if Some(attempt) == fail_injection {
            return Err(anyhow!("mempool rejected operation"));
        }
        let hash = format!("oo{signed}");
        injected.injected.lock().unwrap().push(hash.clone());
        if include {
            let last = injected
                .forged
                .lock()
                .unwrap()
                .last()
                .and_then(|batch| batch.last())
                .map(|i| i.counter)
                .unwrap_or(START_COUNTER);
            injected.landed_counter.store(last, Ordering::SeqCst);
        }
        Ok(hash)
    });

    let included = ledger;
    chain.expect_included_operation_hashes().returning(move |_| {
        if include {
            Ok(vec![included.injected.lock().unwrap().clone()])
        } else {
            Ok(vec![vec![]])
        }
    });

    chain
}

fn engine(chain: MockChain, indexer: MockIndexer, settings: PayoutSettings) -> PayoutEngine {
    PayoutEngine::new(Arc::new(chain), Arc::new(indexer), settings).unwrap()
}

#[tokio::test]
async fn test_execute_pays_every_batch_with_contiguous_counters() -> Result<()> {
    let ledger = Arc::new(Ledger::default());
    let engine = engine(
        chain_with(ledger.clone(), None, true),
        indexer_with(five_delegators()),
        settings(2),
    );

    let report = engine.execute(CYCLE).await?;

    assert!(!report.dry_run);
    assert_eq!(report.reward_pool, 446_351_790);
    assert_eq!(report.payments.len(), 5);
    assert_eq!(report.payments[0].destination, "tz1delegator0");
    assert_eq!(report.payments[0].amount, 34_665_260);

    assert_eq!(
        ledger.counters(),
        vec![vec![1_001, 1_002], vec![1_003, 1_004], vec![1_005]]
    );
    let lengths: Vec<_> = report.batches.iter().map(|b| b.payments.len()).collect();
    assert_eq!(lengths, vec![2, 2, 1]);
    assert!(report.is_complete());
    assert_eq!(report.confirmed_batches(), 3);
    assert_eq!(report.batches[1].first_counter, Some(1_003));
    assert_eq!(report.batches[1].last_counter, Some(1_004));

    assert_eq!(report.operation_links.len(), 3);
    assert_eq!(report.operation_links[0], "https://tzkt.io/oounsigned1signed");
    Ok(())
}

#[tokio::test]
async fn test_blacklisted_and_small_payments_never_reach_the_chain() -> Result<()> {
    let mut split = five_delegators();
    split.delegators.push(Recipient::new("tz1dust", 1_000_000));

    let mut settings = settings(10);
    settings.blacklist = vec!["tz1delegator2".to_string()];
    settings.minimum_payment = 1_000;

    let ledger = Arc::new(Ledger::default());
    let engine = engine(chain_with(ledger.clone(), None, true), indexer_with(split), settings);
    let report = engine.execute(CYCLE).await?;

    let destinations = ledger.destinations();
    assert_eq!(destinations.len(), 4);
    assert!(!destinations.iter().any(|d| d == "tz1delegator2" || d == "tz1dust"));

    let blacklisted = report
        .snapshot
        .delegators
        .iter()
        .find(|d| d.address == "tz1delegator2")
        .unwrap();
    assert!(blacklisted.blacklisted);
    assert_eq!(blacklisted.net_reward, 143_136_127);
    Ok(())
}

#[tokio::test]
async fn test_batches_after_a_failed_injection_are_skipped() -> Result<()> {
    let ledger = Arc::new(Ledger::default());
    let engine = engine(
        chain_with(ledger.clone(), Some(1), true),
        indexer_with(five_delegators()),
        settings(2),
    );

    let report = engine.execute(CYCLE).await?;

    assert_eq!(report.batches[0].status, BatchStatus::Confirmed);
    assert!(matches!(
        &report.batches[1].status,
        BatchStatus::Failed { reason } if reason.contains("mempool rejected operation")
    ));
    assert_eq!(report.batches[2].status, BatchStatus::Skipped);
    assert_eq!(ledger.counters().len(), 2);
    assert_eq!(report.operation_links.len(), 1);
    assert!(!report.is_complete());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_batch_stops_the_cycle() -> Result<()> {
    let ledger = Arc::new(Ledger::default());
    let engine = engine(
        chain_with(ledger.clone(), None, false),
        indexer_with(five_delegators()),
        settings(2),
    );

    let report = engine.execute(CYCLE).await?;

    let statuses: Vec<_> = report.batches.iter().map(|b| b.status.clone()).collect();
    assert_eq!(
        statuses,
        vec![BatchStatus::Unconfirmed, BatchStatus::Skipped, BatchStatus::Skipped]
    );
    assert_eq!(ledger.counters(), vec![vec![1_001, 1_002]]);
    assert!(report.batches[0].operation_hash.is_some());
    Ok(())
}

#[tokio::test]
async fn test_insufficient_balance_fails_before_submission() {
    let mut chain = MockChain::new();
    chain
        .expect_current_block_header()
        .returning(|| Ok(head(1_600_000, CYCLE + 1)));
    chain.expect_account_balance().returning(|_, _| Ok(1_000));
    chain
        .expect_account_counter()
        .returning(|_, _| Ok(START_COUNTER));
    chain.expect_forge_operation().times(0);

    let engine = engine(chain, indexer_with(five_delegators()), settings(2));
    let err = engine.execute(CYCLE).await.unwrap_err();

    assert_eq!(err.to_string(), format!("failed to execute payout for cycle {CYCLE}"));
    assert!(matches!(
        err.root_cause().downcast_ref::<PayoutError>(),
        Some(PayoutError::InsufficientBalance { available: 1_000, .. })
    ));
}

#[tokio::test]
async fn test_indexer_failure_carries_cycle_context() {
    let mut indexer = MockIndexer::new();
    indexer
        .expect_reward_split()
        .returning(|_, _| Err(anyhow!("503 Service Unavailable")));

    let engine = engine(MockChain::new(), indexer, settings(2));
    let err = engine.execute(CYCLE).await.unwrap_err();

    let chain: Vec<_> = err.chain().map(|e| e.to_string()).collect();
    assert_eq!(
        chain,
        vec![
            format!("failed to execute payout for cycle {CYCLE}"),
            "failed to fetch reward split".to_string(),
            "503 Service Unavailable".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_zero_staking_balance_is_rejected() {
    let mut split = five_delegators();
    split.staking_balance = 0;

    let engine = engine(MockChain::new(), indexer_with(split), settings(2));
    let err = engine.compute(CYCLE).await.unwrap_err();

    assert_eq!(err.to_string(), format!("failed to compute payout for cycle {CYCLE}"));
    assert!(matches!(
        err.root_cause().downcast_ref::<PayoutError>(),
        Some(PayoutError::InvalidSnapshot { cycle: CYCLE, .. })
    ));
}

#[tokio::test]
async fn test_compute_does_not_touch_the_chain() -> Result<()> {
    let engine = engine(MockChain::new(), indexer_with(five_delegators()), settings(2));
    let report = engine.compute(CYCLE).await?;

    assert!(report.dry_run);
    assert_eq!(report.batches.len(), 3);
    assert!(report
        .batches
        .iter()
        .all(|b| b.status == BatchStatus::Pending));
    assert_eq!(report.total_paid(), report.payments.iter().map(|p| p.amount).sum::<Mutez>());
    Ok(())
}

#[tokio::test]
async fn test_empty_delegation_submits_nothing() -> Result<()> {
    let engine = engine(MockChain::new(), indexer_with(snapshot(vec![])), settings(2));
    let report = engine.execute(CYCLE).await?;

    assert!(report.batches.is_empty());
    assert!(report.is_complete());
    Ok(())
}

#[tokio::test]
async fn test_pool_rewards_are_paid_to_providers() -> Result<()> {
    let split = snapshot(vec![
        Recipient::new("tz1delegator0", 100_000_000_000),
        Recipient::new(POOL, SCENARIO_BALANCE),
    ]);

    let mut indexer = indexer_with(split);
    indexer
        .expect_cycle_info()
        .withf(|cycle| *cycle == CYCLE)
        .times(1)
        .returning(|cycle| {
            Ok(CycleInfo {
                index: cycle,
                first_level: 1_589_249,
                last_level: 1_593_344,
                snapshot_level: 1_589_248,
            })
        });
    indexer
        .expect_search_transactions()
        .returning(|_| Ok(vec![add_liquidity("oo1", 1_500_000, PROVIDER_A)]));

    let ledger = Arc::new(Ledger::default());
    let mut chain = chain_with(ledger.clone(), None, true);
    chain
        .expect_contract_storage()
        .withf(|block, address| block == "1589248" && address == POOL)
        .returning(|_, _| Ok(pool_storage(1509, 23_567_891)));
    chain
        .expect_big_map_entry()
        .withf(|block, id, _| block == "1589248" && *id == 1509)
        .returning(|_, _, _| Ok(Some(ledger_entry(23_567_891))));

    let mut settings = settings(10);
    settings.liquidity_contracts = vec![POOL.to_string()];

    let report = engine(chain, indexer, settings).execute(CYCLE).await?;

    assert_eq!(ledger.destinations(), vec!["tz1delegator0", PROVIDER_A]);
    assert_eq!(report.payments[1].pool.as_deref(), Some(POOL));
    assert_eq!(report.payments[1].amount, 32_931_997);
    Ok(())
}

#[tokio::test]
async fn test_pool_resolution_failure_aborts_the_cycle() {
    let split = snapshot(vec![Recipient::new(POOL, SCENARIO_BALANCE)]);
    let mut indexer = indexer_with(split);
    indexer.expect_cycle_info().returning(|cycle| {
        Ok(CycleInfo {
            index: cycle,
            first_level: 1,
            last_level: 2,
            snapshot_level: 1,
        })
    });

    let mut chain = MockChain::new();
    chain
        .expect_contract_storage()
        .returning(|_, _| Err(anyhow!("timeout")));
    chain.expect_forge_operation().times(0);

    let mut settings = settings(10);
    settings.liquidity_contracts = vec![POOL.to_string()];

    let err = engine(chain, indexer, settings).execute(CYCLE).await.unwrap_err();
    assert!(format!("{err:#}").contains(&format!("failed to resolve liquidity providers of {POOL}")));
}

#[tokio::test]
async fn test_engine_as_cycle_payout() -> Result<()> {
    let ledger = Arc::new(Ledger::default());
    let payout: Arc<dyn CyclePayout> = Arc::new(engine(
        chain_with(ledger, None, true),
        indexer_with(five_delegators()),
        settings(5),
    ));

    let report = payout.execute(CYCLE, ResumePoint::default()).await?;
    assert_eq!(report.cycle, CYCLE);
    assert_eq!(report.batches.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_queue_resumes_remaining_batches_after_failed_injection() -> Result<()> {
    let ledger = Arc::new(Ledger::default());
    let payout: Arc<dyn CyclePayout> = Arc::new(engine(
        chain_with(ledger.clone(), Some(1), true),
        indexer_with(five_delegators()),
        settings(2),
    ));

    let queue = PayoutQueue::new(Duration::from_secs(30));
    queue.enqueue(PayoutJob::new(CYCLE, payout)).await;

    match queue.process_next().await {
        Some(JobOutcome::Partial { report, resume }) => {
            assert_eq!(report.confirmed_batches(), 1);
            assert_eq!(
                resume,
                ResumePoint {
                    batch: 1,
                    pending_counter: None,
                }
            );
        }
        other => panic!("expected a partial payout, got {other:?}"),
    }
    assert_eq!(queue.len().await, 1);
    assert_eq!(queue.front_cycle().await, Some(CYCLE));

    match queue.process_next().await {
        Some(JobOutcome::Paid(report)) => {
            assert_eq!(
                statuses(&report),
                vec![
                    BatchStatus::PaidEarlier,
                    BatchStatus::Confirmed,
                    BatchStatus::Confirmed
                ]
            );
            assert!(report.is_complete());
        }
        other => panic!("expected the cycle to finish, got {other:?}"),
    }
    assert!(queue.is_empty().await);

    assert_eq!(
        ledger.counters(),
        vec![
            vec![1_001, 1_002],
            vec![1_003, 1_004],
            vec![1_003, 1_004],
            vec![1_005]
        ]
    );
    let first_batch_paid = ledger
        .destinations()
        .iter()
        .filter(|d| *d == "tz1delegator0")
        .count();
    assert_eq!(first_batch_paid, 1);
    Ok(())
}

#[tokio::test]
async fn test_resume_does_not_resend_a_batch_that_landed_late() -> Result<()> {
    let ledger = Arc::new(Ledger::default());
    ledger.landed_counter.store(1_002, Ordering::SeqCst);
    let engine = engine(
        chain_with(ledger.clone(), None, true),
        indexer_with(five_delegators()),
        settings(2),
    );

    let report = engine
        .resume(
            CYCLE,
            ResumePoint {
                batch: 0,
                pending_counter: Some(1_002),
            },
        )
        .await?;

    assert_eq!(
        statuses(&report),
        vec![
            BatchStatus::PaidEarlier,
            BatchStatus::Confirmed,
            BatchStatus::Confirmed
        ]
    );
    assert_eq!(ledger.counters(), vec![vec![1_003, 1_004], vec![1_005]]);
    Ok(())
}

#[tokio::test]
async fn test_resume_resends_an_unconfirmed_batch_that_never_landed() -> Result<()> {
    let ledger = Arc::new(Ledger::default());
    let engine = engine(
        chain_with(ledger.clone(), None, true),
        indexer_with(five_delegators()),
        settings(2),
    );

    let report = engine
        .resume(
            CYCLE,
            ResumePoint {
                batch: 1,
                pending_counter: Some(1_004),
            },
        )
        .await?;

    assert_eq!(report.batches[0].status, BatchStatus::PaidEarlier);
    assert!(report.is_complete());
    assert_eq!(ledger.counters(), vec![vec![1_001, 1_002], vec![1_003]]);
    Ok(())
}

#[tokio::test]
async fn test_resume_past_the_last_batch_is_an_error() {
    let engine = engine(MockChain::new(), indexer_with(five_delegators()), settings(2));
    let err = engine
        .resume(
            CYCLE,
            ResumePoint {
                batch: 4,
                pending_counter: None,
            },
        )
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("cannot resume from batch 4"));
}

#[test]
fn test_invalid_settings_are_rejected() {
    let mut bad = settings(2);
    bad.batch_size = 0;

    let result = PayoutEngine::new(
        Arc::new(MockChain::new()),
        Arc::new(MockIndexer::new()),
        bad,
    );
    assert!(matches!(result, Err(PayoutError::InvalidSettings(_))));
}
