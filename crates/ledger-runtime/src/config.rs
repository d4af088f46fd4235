//! Harness configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ledger_core::{LedgerError, LedgerResult, MAX_ACCOUNT_INDEX};
use ledger_store::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

/// How transfers reach the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// Read and write inside one transaction
    Atomic,
    /// Read and write through the direct handle, no isolation
    Direct,
}

/// Log output settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
    /// Emit JSON lines instead of the human format
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".into(),
            json: false,
        }
    }
}

/// Probe configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Accounts in the ledger
    pub num_accounts: u64,
    /// Concurrent transfer workers
    pub num_workers: usize,
    /// Starting balance of every account
    pub initial_balance: i64,
    /// Exclusive upper bound of transfer amounts
    pub max_transfer_amount: i64,
    /// Invariant check period
    pub check_interval_ms: u64,
    /// Run transfers inside transactions
    pub use_transactions: bool,
    /// Attempts per transaction before a conflict is fatal
    pub max_commit_attempts: u32,
    /// Base seed for worker RNGs; entropy when absent
    pub seed: Option<u64>,
    pub log: LogConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            num_accounts: 10,
            num_workers: 1000,
            initial_balance: 1000,
            max_transfer_amount: 100,
            check_interval_ms: 1000,
            use_transactions: true,
            max_commit_attempts: DEFAULT_MAX_ATTEMPTS,
            seed: None,
            log: LogConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Small, fast, reproducible configuration for tests
    pub fn light() -> Self {
        HarnessConfig {
            num_accounts: 5,
            num_workers: 4,
            check_interval_ms: 20,
            seed: Some(42),
            ..HarnessConfig::default()
        }
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            LedgerError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &[u8]) -> LedgerResult<Self> {
        serde_json::from_slice(raw).map_err(|e| LedgerError::InvalidConfig(e.to_string()))
    }

    /// Reject configurations the probe cannot run
    pub fn validate(&self) -> LedgerResult<()> {
        if self.num_accounts < 2 {
            return Err(invalid("num_accounts must be at least 2"));
        }
        if self.num_accounts > MAX_ACCOUNT_INDEX {
            return Err(invalid(format!(
                "num_accounts must be at most {}",
                MAX_ACCOUNT_INDEX
            )));
        }
        if self.num_workers == 0 {
            return Err(invalid("num_workers must be at least 1"));
        }
        if self.initial_balance < 0 {
            return Err(invalid("initial_balance must not be negative"));
        }
        if self.max_transfer_amount < 1 {
            return Err(invalid("max_transfer_amount must be at least 1"));
        }
        if self.check_interval_ms == 0 {
            return Err(invalid("check_interval_ms must be positive"));
        }
        if self.max_commit_attempts == 0 {
            return Err(invalid("max_commit_attempts must be at least 1"));
        }
        self.expected_total().map(|_| ())
    }

    /// The conserved total: `num_accounts * initial_balance`
    pub fn expected_total(&self) -> LedgerResult<i64> {
        i64::try_from(self.num_accounts)
            .ok()
            .and_then(|n| n.checked_mul(self.initial_balance))
            .ok_or_else(|| invalid("num_accounts * initial_balance overflows i64"))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn transfer_mode(&self) -> TransferMode {
        if self.use_transactions {
            TransferMode::Atomic
        } else {
            TransferMode::Direct
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_commit_attempts)
    }

    /// RNG seed for one worker
    pub fn worker_seed(&self, worker: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(worker as u64))
    }
}

fn invalid(msg: impl Into<String>) -> LedgerError {
    LedgerError::InvalidConfig(msg.into())
}
