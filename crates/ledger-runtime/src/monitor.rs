//! Invariant monitor
//!
//! Sums every balance inside one atomic read and compares the sum with the
//! conserved total. A mismatch means the store let a transfer be half
//! applied, or let two transfers overwrite each other.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use ledger_core::{LedgerError, LedgerResult};
use ledger_store::{run_atomic, RetryPolicy, Store};

use crate::{read_ledger, HarnessConfig, LedgerSnapshot, TransferCounter, TransferCounts};

/// Result of one passing invariant check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Audit {
    /// Transfer counts read just before the scan
    pub transfers: TransferCounts,
    /// Observed sum of balances
    pub total: i64,
    /// Conserved total
    pub expected: i64,
    /// Accounts read
    pub accounts: usize,
}

/// Periodic conservation check
pub struct InvariantMonitor {
    store: Arc<dyn Store>,
    counter: Arc<TransferCounter>,
    num_accounts: u64,
    expected_total: i64,
    retry: RetryPolicy,
}

impl InvariantMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        counter: Arc<TransferCounter>,
        config: &HarnessConfig,
    ) -> LedgerResult<Self> {
        Ok(InvariantMonitor {
            store,
            counter,
            num_accounts: config.num_accounts,
            expected_total: config.expected_total()?,
            retry: config.retry_policy(),
        })
    }

    pub fn expected_total(&self) -> i64 {
        self.expected_total
    }

    /// Read the whole ledger as one consistent snapshot
    pub async fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        let num_accounts = self.num_accounts;
        run_atomic(&*self.store, self.retry, |txn| {
            read_ledger(txn, num_accounts).boxed()
        })
        .await
    }

    /// One audit: fails on a gap, a negative balance, or a changed total
    pub async fn check(&self) -> LedgerResult<Audit> {
        let transfers = self.counter.snapshot();
        let snapshot = self.snapshot().await?;

        snapshot.check_non_negative()?;
        let total = snapshot.total()?;
        if total != self.expected_total {
            error!(
                observed = total,
                expected = self.expected_total,
                applied = transfers.applied,
                "ledger invariant violated"
            );
            return Err(LedgerError::InvariantViolation {
                observed: total,
                expected: self.expected_total,
            });
        }

        Ok(Audit {
            transfers,
            total,
            expected: self.expected_total,
            accounts: snapshot.accounts.len(),
        })
    }

    /// Check every `period` until shutdown; returns the number of passing checks
    pub async fn run(
        &self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> LedgerResult<u64> {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut checks = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let audit = self.check().await?;
                    checks += 1;
                    info!(
                        transfers = audit.transfers.applied,
                        skipped = audit.transfers.skipped,
                        total = audit.total,
                        "{} transfers were executed, the bank is in good order",
                        audit.transfers.applied
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        Ok(checks)
    }
}
