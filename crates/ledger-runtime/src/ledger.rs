//! Ledger operations over any runner
//!
//! These functions are the unit of work handed to `run_atomic`, or run
//! straight against the direct handle when transactions are disabled. They
//! never keep state between calls: every attempt re-reads the store.

use ledger_core::{
    ledger_range, Account, AccountId, LedgerError, LedgerResult, Transfer, TransferOutcome,
};
use ledger_store::Runner;

/// Write `num_accounts` records holding `balance` in one batch
pub async fn seed_accounts<R>(runner: &mut R, num_accounts: u64, balance: i64) -> LedgerResult<()>
where
    R: Runner + ?Sized,
{
    let value = Account::new(balance).encode()?;
    let rows = (0..num_accounts)
        .map(|index| Ok((AccountId::new(index)?.key(), value.clone())))
        .collect::<LedgerResult<Vec<_>>>()?;
    runner.put_batch(rows).await
}

/// Read both sides of `transfer`, and write them back if the source can pay
pub async fn execute_transfer<R>(runner: &mut R, transfer: Transfer) -> LedgerResult<TransferOutcome>
where
    R: Runner + ?Sized,
{
    let values = runner
        .get(&[transfer.from.key(), transfer.to.key()])
        .await?;

    let mut records = [transfer.from, transfer.to]
        .into_iter()
        .zip(values)
        .map(|(id, value)| {
            value
                .ok_or(LedgerError::MissingAccount(id))
                .and_then(|bytes| Account::decode(&bytes))
        });
    let from = records
        .next()
        .ok_or(LedgerError::MissingAccount(transfer.from))??;
    let to = records
        .next()
        .ok_or(LedgerError::MissingAccount(transfer.to))??;

    let outcome = transfer.apply(from, to)?;
    if let TransferOutcome::Applied { from, to } = outcome {
        runner
            .put_batch(vec![
                (transfer.from.key(), from.encode()?),
                (transfer.to.key(), to.encode()?),
            ])
            .await?;
    }
    Ok(outcome)
}

/// Every account record, in index order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub accounts: Vec<(AccountId, Account)>,
}

impl LedgerSnapshot {
    /// Sum of all balances, `BalanceOverflow` if it does not fit
    pub fn total(&self) -> LedgerResult<i64> {
        self.accounts.iter().try_fold(0i64, |sum, (id, account)| {
            sum.checked_add(account.balance)
                .ok_or(LedgerError::BalanceOverflow(*id))
        })
    }

    pub fn balances(&self) -> Vec<i64> {
        self.accounts.iter().map(|(_, a)| a.balance).collect()
    }

    /// First account holding a negative balance
    pub fn check_non_negative(&self) -> LedgerResult<()> {
        match self.accounts.iter().find(|(_, a)| a.balance < 0) {
            Some((account, a)) => Err(LedgerError::NegativeBalance {
                account: *account,
                balance: a.balance,
            }),
            None => Ok(()),
        }
    }
}

/// Scan and decode the whole ledger; fewer rows than accounts is fatal
pub async fn read_ledger<R>(runner: &mut R, num_accounts: u64) -> LedgerResult<LedgerSnapshot>
where
    R: Runner + ?Sized,
{
    let (start, end) = ledger_range(num_accounts)?;
    let expected = usize::try_from(num_accounts)
        .map_err(|_| LedgerError::AccountIndexOutOfRange(num_accounts))?;

    let rows = runner.scan_exact(&start, &end, expected).await?;
    let accounts = rows
        .iter()
        .map(|row| Ok((AccountId::from_key(&row.key)?, Account::decode(&row.value)?)))
        .collect::<LedgerResult<Vec<_>>>()?;

    Ok(LedgerSnapshot { accounts })
}
