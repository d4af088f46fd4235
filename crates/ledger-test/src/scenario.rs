//! Deterministic ledger fixtures
//!
//! A small ledger in a fresh [`MemoryStore`] with balances chosen by the
//! test, plus the handful of operations the scenario tests need.

use futures::FutureExt;

use ledger_core::{Account, AccountId, LedgerResult, Transfer, TransferOutcome};
use ledger_runtime::{execute_transfer, read_ledger, seed_accounts, LedgerSnapshot};
use ledger_store::{run_atomic, MemoryStore, RetryPolicy, Store};

/// A seeded ledger
pub struct LedgerFixture {
    store: MemoryStore,
    num_accounts: u64,
}

impl LedgerFixture {
    /// `num_accounts` accounts all holding `balance`
    pub async fn uniform(num_accounts: u64, balance: i64) -> LedgerResult<Self> {
        let store = MemoryStore::new();
        seed_accounts(&mut *store.direct(), num_accounts, balance).await?;
        Ok(LedgerFixture {
            store,
            num_accounts,
        })
    }

    /// One account per entry of `balances`, in index order
    pub async fn with_balances(balances: &[i64]) -> LedgerResult<Self> {
        let store = MemoryStore::new();
        let rows = balances
            .iter()
            .enumerate()
            .map(|(index, &balance)| {
                Ok((
                    AccountId::new(index as u64)?.key(),
                    Account::new(balance).encode()?,
                ))
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        store.direct().put_batch(rows).await?;

        Ok(LedgerFixture {
            store,
            num_accounts: balances.len() as u64,
        })
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Move `amount` from `from` to `to` inside one transaction
    pub async fn transfer(&self, from: u64, to: u64, amount: i64) -> LedgerResult<TransferOutcome> {
        let transfer = Transfer::new(AccountId::new(from)?, AccountId::new(to)?, amount);
        run_atomic(&self.store, RetryPolicy::default(), |txn| {
            execute_transfer(txn, transfer).boxed()
        })
        .await
    }

    /// Drop one account record, leaving a gap in the ledger
    pub async fn remove(&self, index: u64) -> LedgerResult<()> {
        self.store.direct().delete(AccountId::new(index)?.key()).await
    }

    pub async fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        read_ledger(&mut *self.store.direct(), self.num_accounts).await
    }

    pub async fn balances(&self) -> LedgerResult<Vec<i64>> {
        Ok(self.snapshot().await?.balances())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::LedgerError;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_scenario_a_simple_transfer() {
        let ledger = LedgerFixture::uniform(3, 1000).await.unwrap();

        let outcome = ledger.transfer(0, 1, 100).await.unwrap();
        assert!(outcome.is_applied());
        assert_eq!(ledger.balances().await.unwrap(), vec![900, 1100, 1000]);
        assert_eq!(ledger.snapshot().await.unwrap().total().unwrap(), 3000);
    }

    #[tokio::test]
    async fn test_scenario_b_insufficient_funds() {
        let ledger = LedgerFixture::with_balances(&[50, 1000]).await.unwrap();
        let before = ledger.store().last_commit();

        let outcome = ledger.transfer(0, 1, 75).await.unwrap();
        assert_eq!(outcome, TransferOutcome::InsufficientFunds { balance: 50 });
        assert_eq!(ledger.balances().await.unwrap(), vec![50, 1000]);
        assert_eq!(ledger.store().last_commit(), before);
    }

    #[tokio::test]
    async fn test_scenario_d_incomplete_scan() {
        let ledger = LedgerFixture::uniform(4, 10).await.unwrap();
        ledger.remove(3).await.unwrap();

        assert_eq!(
            ledger.snapshot().await.unwrap_err(),
            LedgerError::IncompleteScan {
                expected: 4,
                actual: 3
            }
        );
    }

    #[tokio::test]
    async fn test_transfer_to_missing_account() {
        let ledger = LedgerFixture::uniform(2, 10).await.unwrap();
        assert_eq!(
            ledger.transfer(0, 7, 1).await.unwrap_err(),
            LedgerError::MissingAccount(AccountId::new(7).unwrap())
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sequential_transfers_conserve(
            balances in prop::collection::vec(0i64..500, 2..6),
            moves in prop::collection::vec((0usize..6, 0usize..6, 0i64..600), 1..20),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let ledger = LedgerFixture::with_balances(&balances).await.unwrap();
                let n = balances.len();
                for (from, to, amount) in moves {
                    let (from, to) = (from % n, to % n);
                    if from == to {
                        continue;
                    }
                    ledger.transfer(from as u64, to as u64, amount).await.unwrap();
                }

                let snapshot = ledger.snapshot().await.unwrap();
                prop_assert_eq!(snapshot.total().unwrap(), balances.iter().sum::<i64>());
                prop_assert!(snapshot.check_non_negative().is_ok());
                Ok(())
            })?;
        }
    }
}
