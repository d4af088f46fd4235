//! Bank orchestrator
//!
//! Seeds the ledger, starts the transfer workers, and runs the invariant
//! monitor on the calling task. The run ends on the first fatal error from
//! either side, or when the shutdown signal fires.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};

use ledger_core::{LedgerError, LedgerResult};
use ledger_store::Store;

use crate::{
    seed_accounts, HarnessConfig, InvariantMonitor, TransferCounter, TransferCounts,
    TransferWorker, WorkerReport,
};

/// Summary of a run that ended by shutdown
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Passing invariant checks
    pub checks: u64,
    pub transfers: TransferCounts,
    pub workers: Vec<WorkerReport>,
}

/// Stops a running [`Bank`] from outside
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The probe: a ledger, its workers, and its monitor
pub struct Bank {
    config: HarnessConfig,
    store: Arc<dyn Store>,
    counter: Arc<TransferCounter>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Bank {
    pub fn new(store: Arc<dyn Store>, config: HarnessConfig) -> LedgerResult<Self> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);

        Ok(Bank {
            config,
            store,
            counter: Arc::new(TransferCounter::new()),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Write every account with the starting balance in one batch
    pub async fn initialize(&self) -> LedgerResult<()> {
        let mut direct = self.store.direct();
        seed_accounts(
            &mut *direct,
            self.config.num_accounts,
            self.config.initial_balance,
        )
        .await?;

        info!(
            accounts = self.config.num_accounts,
            balance = self.config.initial_balance,
            "done initializing all accounts"
        );
        Ok(())
    }

    pub fn monitor(&self) -> LedgerResult<InvariantMonitor> {
        InvariantMonitor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.counter),
            &self.config,
        )
    }

    fn spawn_workers(&self) -> JoinSet<LedgerResult<WorkerReport>> {
        let mut workers = JoinSet::new();
        for id in 0..self.config.num_workers {
            let worker = TransferWorker::new(
                id,
                Arc::clone(&self.store),
                Arc::clone(&self.counter),
                &self.config,
            );
            workers.spawn(worker.run(self.shutdown.subscribe()));
        }
        workers
    }

    /// Initialize, then transfer and check until a fatal error or shutdown
    pub async fn run(&self) -> LedgerResult<RunReport> {
        if !self.config.use_transactions {
            warn!("use of a transaction has been disabled");
        }

        self.initialize().await?;
        let monitor = self.monitor()?;
        let mut workers = self.spawn_workers();
        let mut reports = Vec::with_capacity(self.config.num_workers);
        info!(workers = self.config.num_workers, "transfer workers started");

        let outcome = {
            let monitor_run = monitor.run(self.config.check_interval(), self.shutdown.subscribe());
            tokio::pin!(monitor_run);

            loop {
                tokio::select! {
                    result = &mut monitor_run => break result,
                    Some(joined) = workers.join_next() => match worker_result(joined) {
                        Ok(report) => reports.push(report),
                        Err(e) => break Err(e),
                    },
                }
            }
        };

        self.shutdown.send_replace(true);
        let drained = drain_workers(&mut workers, &mut reports).await;

        let checks = outcome?;
        drained?;

        reports.sort_by_key(|r| r.worker);
        let report = RunReport {
            checks,
            transfers: self.counter.snapshot(),
            workers: reports,
        };
        info!(
            checks = report.checks,
            transfers = report.transfers.applied,
            skipped = report.transfers.skipped,
            "run stopped"
        );
        Ok(report)
    }
}

fn worker_result(
    joined: Result<LedgerResult<WorkerReport>, JoinError>,
) -> LedgerResult<WorkerReport> {
    joined.map_err(|e| LedgerError::Task(e.to_string()))?
}

/// Wait for every worker; keeps the first error
async fn drain_workers(
    workers: &mut JoinSet<LedgerResult<WorkerReport>>,
    reports: &mut Vec<WorkerReport>,
) -> LedgerResult<()> {
    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        match worker_result(joined) {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(error = %e, "worker failed while stopping");
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ledger_store::{Fault, MemoryStore, MemoryStoreConfig};

    use crate::read_ledger;

    fn stop_after(handle: ShutdownHandle, after: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            handle.shutdown();
        });
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = HarnessConfig {
            num_workers: 0,
            ..HarnessConfig::light()
        };
        assert!(matches!(
            Bank::new(Arc::new(MemoryStore::new()), config),
            Err(LedgerError::InvalidConfig(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_until_shutdown_conserves_total() {
        let store = MemoryStore::new();
        let bank = Bank::new(Arc::new(store.clone()), HarnessConfig::light()).unwrap();

        stop_after(bank.shutdown_handle(), Duration::from_millis(150));
        let report = bank.run().await.unwrap();

        assert!(report.checks >= 1);
        assert_eq!(report.workers.len(), 4);
        assert_eq!(
            report.transfers.applied,
            report.workers.iter().map(|w| w.applied).sum::<u64>()
        );
        assert!(bank.shutdown_handle().is_shutdown());

        let snapshot = read_ledger(&mut *store.direct(), 5).await.unwrap();
        assert_eq!(snapshot.total().unwrap(), 5000);
        snapshot.check_non_negative().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_failure_ends_run() {
        let store = MemoryStore::new();
        let bank = Bank::new(Arc::new(store.clone()), HarnessConfig::light()).unwrap();
        store.inject(Fault::FailReads);

        let err = bank.run().await.unwrap_err();
        assert!(matches!(err, LedgerError::ReadError { .. }));
        assert!(bank.shutdown_handle().is_shutdown());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_direct_mode_stops_on_violation() {
        let store = MemoryStore::with_config(MemoryStoreConfig::with_latency(
            Duration::from_millis(1),
        ));
        let config = HarnessConfig {
            num_accounts: 3,
            num_workers: 16,
            use_transactions: false,
            check_interval_ms: 20,
            seed: Some(11),
            ..HarnessConfig::default()
        };
        let bank = Bank::new(Arc::new(store), config).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), bank.run())
            .await
            .expect("run did not stop on its own");

        assert!(matches!(
            result,
            Err(LedgerError::InvariantViolation { expected: 3000, .. })
        ));
        assert!(bank.shutdown_handle().is_shutdown());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_initialize_failure_is_fatal() {
        let store = MemoryStore::new();
        store.inject(Fault::FailWrites);
        let bank = Bank::new(Arc::new(store), HarnessConfig::light()).unwrap();

        assert!(matches!(
            bank.run().await,
            Err(LedgerError::WriteError { .. })
        ));
    }
}
