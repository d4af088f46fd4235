//! Bounded stress harness
//!
//! Runs the bank workload for a fixed number of transfers per worker and
//! audits the ledger while it runs. Unlike the orchestrator, a failed audit
//! does not stop anything: violations are collected so a test can assert on
//! them, which is how the unprotected mode is demonstrated.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use ledger_core::{LedgerError, LedgerResult};
use ledger_runtime::{
    seed_accounts, Audit, HarnessConfig, InvariantMonitor, TransferCounter, TransferWorker,
    WorkerReport,
};
use ledger_store::{MemoryStore, MemoryStoreConfig, Store};

/// Stress run configuration
#[derive(Clone, Debug)]
pub struct StressConfig {
    pub harness: HarnessConfig,
    /// Transfers attempted by each worker
    pub iterations: u64,
    /// Time between audits while workers run
    pub audit_interval: Duration,
    /// Store latency per operation
    pub op_latency: Option<Duration>,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            harness: HarnessConfig {
                num_workers: 16,
                seed: Some(42),
                ..HarnessConfig::default()
            },
            iterations: 200,
            audit_interval: Duration::from_millis(10),
            op_latency: None,
        }
    }
}

impl StressConfig {
    /// Quick run for unit tests
    pub fn light() -> Self {
        StressConfig {
            harness: HarnessConfig::light(),
            iterations: 50,
            audit_interval: Duration::from_millis(5),
            op_latency: None,
        }
    }

    /// Many workers fighting over three accounts
    pub fn contended() -> Self {
        StressConfig {
            harness: HarnessConfig {
                num_accounts: 3,
                num_workers: 32,
                max_commit_attempts: 1000,
                seed: Some(7),
                ..HarnessConfig::default()
            },
            iterations: 100,
            audit_interval: Duration::from_millis(5),
            op_latency: None,
        }
    }

    /// No transactions, with latency to widen every race window
    pub fn unprotected() -> Self {
        StressConfig {
            harness: HarnessConfig {
                num_accounts: 3,
                num_workers: 16,
                use_transactions: false,
                seed: Some(11),
                ..HarnessConfig::default()
            },
            iterations: 50,
            audit_interval: Duration::from_millis(5),
            op_latency: Some(Duration::from_millis(1)),
        }
    }
}

/// What a stress run observed
#[derive(Debug, Default)]
pub struct StressResult {
    pub workers: Vec<WorkerReport>,
    /// Audits that passed
    pub audits: Vec<Audit>,
    /// Audits that found a broken invariant
    pub violations: Vec<LedgerError>,
    /// Sum of balances after every worker finished
    pub final_total: i64,
    pub expected_total: i64,
}

impl StressResult {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty() && self.final_total == self.expected_total
    }

    pub fn applied(&self) -> u64 {
        self.workers.iter().map(|w| w.applied).sum()
    }

    pub fn attempts(&self) -> u64 {
        self.workers.iter().map(|w| w.attempts).sum()
    }
}

/// Bank workload with a fixed amount of work
pub struct StressHarness {
    config: StressConfig,
    store: MemoryStore,
}

impl StressHarness {
    pub fn new(config: StressConfig) -> LedgerResult<Self> {
        config.harness.validate()?;
        let store = MemoryStore::with_config(MemoryStoreConfig {
            op_latency: config.op_latency,
        });
        Ok(StressHarness { config, store })
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Seed, run every worker to completion, audit throughout and at the end
    pub async fn run(&self) -> LedgerResult<StressResult> {
        let harness = &self.config.harness;
        seed_accounts(
            &mut *self.store.direct(),
            harness.num_accounts,
            harness.initial_balance,
        )
        .await?;

        let store: Arc<dyn Store> = Arc::new(self.store.clone());
        let counter = Arc::new(TransferCounter::new());
        let monitor = InvariantMonitor::new(Arc::clone(&store), Arc::clone(&counter), harness)?;

        let mut workers = JoinSet::new();
        for id in 0..harness.num_workers {
            let worker =
                TransferWorker::new(id, Arc::clone(&store), Arc::clone(&counter), harness);
            workers.spawn(worker.run_for(self.config.iterations));
        }

        let mut result = StressResult {
            expected_total: monitor.expected_total(),
            ..StressResult::default()
        };
        let mut ticker = interval(self.config.audit_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(joined) => {
                        let report = joined.map_err(|e| LedgerError::Task(e.to_string()))??;
                        result.workers.push(report);
                    }
                    None => break,
                },
                _ = ticker.tick() => record(monitor.check().await, &mut result)?,
            }
        }

        record(monitor.check().await, &mut result)?;
        result.final_total = monitor.snapshot().await?.total()?;
        result.workers.sort_by_key(|w| w.worker);

        info!(
            attempts = result.attempts(),
            applied = result.applied(),
            audits = result.audits.len(),
            violations = result.violations.len(),
            final_total = result.final_total,
            expected = result.expected_total,
            "stress run finished"
        );
        Ok(result)
    }
}

fn record(audit: LedgerResult<Audit>, result: &mut StressResult) -> LedgerResult<()> {
    match audit {
        Ok(audit) => result.audits.push(audit),
        Err(e) if e.is_invariant_violation() => {
            warn!(error = %e, "audit failed");
            result.violations.push(e);
        }
        Err(e) => return Err(e),
    }
    Ok(())
}
