//! Error types for the ledger probe

use thiserror::Error;

use crate::AccountId;

/// Ledger probe errors
///
/// Everything except [`LedgerError::Conflict`] is fatal to the run: the probe
/// exists to surface store bugs, not to hide them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // Model errors
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Account index {0} does not fit the key width")]
    AccountIndexOutOfRange(u64),

    #[error("Account {0} is missing from the store")]
    MissingAccount(AccountId),

    #[error("Balance overflow on account {0}")]
    BalanceOverflow(AccountId),

    // Store errors
    #[error("Read error on key {key}: {reason}")]
    ReadError { key: String, reason: String },

    #[error("Write error on key {key}: {reason}")]
    WriteError { key: String, reason: String },

    #[error("Could only read {actual} of {expected} rows")]
    IncompleteScan { expected: usize, actual: usize },

    #[error("Transaction conflict")]
    Conflict,

    #[error("Transaction gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    // Invariant errors
    #[error("Total cash in the bank = {observed}, expected {expected}")]
    InvariantViolation { observed: i64, expected: i64 },

    #[error("Account {account} has negative balance {balance}")]
    NegativeBalance { account: AccountId, balance: i64 },

    // Harness errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Task failed: {0}")]
    Task(String),
}

impl LedgerError {
    /// Whether a transaction wrapper may re-run the unit of work
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict)
    }

    /// Whether this error means the store broke the ledger invariants
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvariantViolation { .. } | LedgerError::NegativeBalance { .. }
        )
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
