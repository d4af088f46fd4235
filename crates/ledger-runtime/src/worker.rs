//! Transfer workers
//!
//! Each worker loops: pick two distinct accounts and an amount, then move the
//! amount inside one atomic unit (or through the direct handle when
//! transactions are disabled). Any error ends the worker and, through the
//! orchestrator, the run.

use std::sync::Arc;

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, trace};

use ledger_core::{AccountId, LedgerError, LedgerResult, Transfer, TransferOutcome};
use ledger_store::{run_atomic, RetryPolicy, Store};

use crate::{execute_transfer, HarnessConfig, TransferCounter, TransferMode};

/// What one worker did before it stopped
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub attempts: u64,
    pub applied: u64,
    pub skipped: u64,
}

/// One concurrent unit of the workload
pub struct TransferWorker {
    id: usize,
    store: Arc<dyn Store>,
    counter: Arc<TransferCounter>,
    num_accounts: u64,
    max_amount: i64,
    mode: TransferMode,
    retry: RetryPolicy,
    rng: StdRng,
    report: WorkerReport,
}

impl TransferWorker {
    pub fn new(
        id: usize,
        store: Arc<dyn Store>,
        counter: Arc<TransferCounter>,
        config: &HarnessConfig,
    ) -> Self {
        let rng = match config.worker_seed(id) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        TransferWorker {
            id,
            store,
            counter,
            num_accounts: config.num_accounts,
            max_amount: config.max_transfer_amount,
            mode: config.transfer_mode(),
            retry: config.retry_policy(),
            rng,
            report: WorkerReport {
                worker: id,
                ..WorkerReport::default()
            },
        }
    }

    /// Draw the next transfer; equal endpoints are redrawn
    pub fn next_transfer(&mut self) -> LedgerResult<Transfer> {
        if self.num_accounts < 2 || self.max_amount < 1 {
            return Err(LedgerError::InvalidConfig(format!(
                "cannot draw transfers over {} accounts with amounts below {}",
                self.num_accounts, self.max_amount
            )));
        }

        let (from, to) = loop {
            let from = self.rng.gen_range(0..self.num_accounts);
            let to = self.rng.gen_range(0..self.num_accounts);
            if from != to {
                break (from, to);
            }
        };
        let amount = self.rng.gen_range(0..self.max_amount);

        Ok(Transfer::new(
            AccountId::new(from)?,
            AccountId::new(to)?,
            amount,
        ))
    }

    /// Run one transfer against the store
    pub async fn attempt(&self, transfer: Transfer) -> LedgerResult<TransferOutcome> {
        match self.mode {
            TransferMode::Atomic => {
                run_atomic(&*self.store, self.retry, |txn| {
                    execute_transfer(txn, transfer).boxed()
                })
                .await
            }
            TransferMode::Direct => {
                let mut direct = self.store.direct();
                execute_transfer(&mut *direct, transfer).await
            }
        }
    }

    /// Draw, attempt, and count one transfer
    pub async fn step(&mut self) -> LedgerResult<TransferOutcome> {
        let transfer = self.next_transfer()?;
        let outcome = self.attempt(transfer).await?;

        self.report.attempts += 1;
        match outcome {
            TransferOutcome::Applied { .. } => {
                self.report.applied += 1;
                self.counter.record_applied();
                trace!(worker = self.id, ?transfer, "transfer applied");
            }
            TransferOutcome::InsufficientFunds { balance } => {
                self.report.skipped += 1;
                self.counter.record_skipped();
                trace!(worker = self.id, ?transfer, balance, "insufficient funds");
            }
        }
        Ok(outcome)
    }

    /// Loop until the shutdown signal turns true or is dropped
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> LedgerResult<WorkerReport> {
        debug!(worker = self.id, "transfer worker started");
        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }
            self.step().await?;
            tokio::task::yield_now().await;
        }
        debug!(worker = self.id, attempts = self.report.attempts, "transfer worker stopped");
        Ok(self.report)
    }

    /// Run exactly `iterations` attempts
    pub async fn run_for(mut self, iterations: u64) -> LedgerResult<WorkerReport> {
        for _ in 0..iterations {
            self.step().await?;
            tokio::task::yield_now().await;
        }
        Ok(self.report)
    }
}
