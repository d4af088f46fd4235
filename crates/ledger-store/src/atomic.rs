//! Atomic execution wrapper
//!
//! `run_atomic` owns conflict handling: a `Conflict` from the unit of work or
//! from commit re-runs the unit against a fresh transaction. Anything else is
//! returned to the caller untouched.

use futures::future::BoxFuture;
use tracing::debug;

use ledger_core::{LedgerError, LedgerResult};

use crate::{Store, Transaction};

/// Default number of attempts before a conflicting unit gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// How often a conflicting transaction is re-run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Run `op` inside a transaction and commit it.
///
/// `op` may run several times, so it must not touch anything outside the
/// transaction handle it is given.
pub async fn run_atomic<S, T, F>(store: &S, policy: RetryPolicy, mut op: F) -> LedgerResult<T>
where
    S: Store + ?Sized,
    T: Send,
    F: for<'t> FnMut(&'t mut dyn Transaction) -> BoxFuture<'t, LedgerResult<T>> + Send,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        let mut txn = store.begin().await?;
        let outcome = op(&mut *txn).await;
        let result = match outcome {
            Ok(value) => txn.commit().await.map(|()| value),
            Err(e) => Err(e),
        };

        match result {
            Err(e) if e.is_retryable() => {
                if attempt >= policy.max_attempts {
                    return Err(LedgerError::RetriesExhausted { attempts: attempt });
                }
                debug!(attempt, "transaction conflict, retrying");
                tokio::task::yield_now().await;
            }
            other => return other,
        }
    }
}
