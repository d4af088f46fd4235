//! Transfer decision
//!
//! The pure part of a transfer: given the two current records, decide whether
//! the transfer happens and what the new records are. Reading and writing the
//! records is the runner's job.

use crate::{Account, AccountId, LedgerError, LedgerResult};

/// A planned transfer between two distinct accounts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: i64,
}

/// Result of applying a transfer to the current records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Both records updated
    Applied { from: Account, to: Account },
    /// Source could not cover the amount; nothing changes
    InsufficientFunds { balance: i64 },
}

impl TransferOutcome {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, TransferOutcome::Applied { .. })
    }
}

impl Transfer {
    pub fn new(from: AccountId, to: AccountId, amount: i64) -> Self {
        Transfer { from, to, amount }
    }

    /// Compute the post-transfer records
    pub fn apply(&self, from: Account, to: Account) -> LedgerResult<TransferOutcome> {
        if from.balance < self.amount {
            return Ok(TransferOutcome::InsufficientFunds {
                balance: from.balance,
            });
        }

        let to_balance = to
            .balance
            .checked_add(self.amount)
            .ok_or(LedgerError::BalanceOverflow(self.to))?;

        let from_balance = from
            .balance
            .checked_sub(self.amount)
            .ok_or(LedgerError::BalanceOverflow(self.from))?;

        Ok(TransferOutcome::Applied {
            from: Account::new(from_balance),
            to: Account::new(to_balance),
        })
    }
}
