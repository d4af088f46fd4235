//! Bank Demo
//!
//! Runs the bank workload against the in-memory reference store until
//! Ctrl-C or the first fatal condition:
//! - Exit 0 after a clean shutdown
//! - Exit 1 on an invariant violation or any store failure
//!
//! `--no-transactions --op-latency 1ms --accounts 3` shows what the monitor
//! reports when the store gives no isolation.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use ledger_core::LedgerResult;
use ledger_runtime::{init_tracing, Bank, HarnessConfig};
use ledger_store::{MemoryStore, MemoryStoreConfig};

#[derive(Parser, Debug)]
#[command(name = "bank-demo")]
#[command(about = "Check that concurrent transfers conserve the total balance", long_about = None)]
struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of accounts
    #[arg(short, long)]
    accounts: Option<u64>,

    /// Number of concurrent transfer workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Starting balance of every account
    #[arg(long)]
    initial_balance: Option<i64>,

    /// Exclusive upper bound of transfer amounts
    #[arg(long)]
    max_amount: Option<i64>,

    /// Time between invariant checks, e.g. `500ms`
    #[arg(long, value_parser = humantime::parse_duration)]
    check_interval: Option<Duration>,

    /// Read and write without transactions
    #[arg(long)]
    no_transactions: bool,

    /// Seed for reproducible worker choices
    #[arg(long)]
    seed: Option<u64>,

    /// Attempts per transaction before a conflict is fatal
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Delay the store adds to every operation, e.g. `1ms`
    #[arg(long, value_parser = humantime::parse_duration)]
    op_latency: Option<Duration>,

    /// Log filter directive, e.g. `info,ledger_store=debug`
    #[arg(long)]
    log_filter: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn harness_config(&self) -> LedgerResult<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_json_file(path)?,
            None => HarnessConfig::default(),
        };

        if let Some(accounts) = self.accounts {
            config.num_accounts = accounts;
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers;
        }
        if let Some(balance) = self.initial_balance {
            config.initial_balance = balance;
        }
        if let Some(amount) = self.max_amount {
            config.max_transfer_amount = amount;
        }
        if let Some(interval) = self.check_interval {
            config.check_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        }
        if self.no_transactions {
            config.use_transactions = false;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(attempts) = self.max_attempts {
            config.max_commit_attempts = attempts;
        }
        if let Some(filter) = &self.log_filter {
            config.log.filter = filter.clone();
        }
        if self.json_logs {
            config.log.json = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.harness_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bank-demo: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_tracing(&config.log) {
        eprintln!("bank-demo: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config, args.op_latency).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bank run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: HarnessConfig, op_latency: Option<Duration>) -> LedgerResult<()> {
    let store = MemoryStore::with_config(MemoryStoreConfig { op_latency });
    let bank = Bank::new(Arc::new(store), config)?;

    let shutdown = bank.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping workers");
            shutdown.shutdown();
        }
    });

    let report = bank.run().await?;
    info!(
        checks = report.checks,
        transfers = report.transfers.applied,
        skipped = report.transfers.skipped,
        workers = report.workers.len(),
        "bank closed in good order"
    );
    Ok(())
}
