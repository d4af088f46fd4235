//! Log subscriber setup

use tracing_subscriber::EnvFilter;

use ledger_core::{LedgerError, LedgerResult};

use crate::LogConfig;

/// Install the global fmt subscriber. `RUST_LOG` wins over `config.filter`.
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> LedgerResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            LedgerError::InvalidConfig(format!("log filter {:?}: {}", config.filter, e))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| LedgerError::InvalidConfig(format!("log subscriber: {}", e)))
}
