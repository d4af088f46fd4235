//! Ledger Runtime - The bank workload and its auditor
//!
//! This crate drives a store through the bank scenario:
//! - Configuration with defaults, presets and JSON loading
//! - Seeding the ledger and executing one transfer over any runner
//! - Transfer workers that loop until shutdown
//! - The invariant monitor that checks the conserved total
//! - The orchestrator that runs workers and monitor together
//! - Log subscriber setup

pub mod bank;
pub mod config;
pub mod counter;
pub mod ledger;
pub mod monitor;
pub mod telemetry;
pub mod worker;

pub use bank::*;
pub use config::*;
pub use counter::*;
pub use ledger::*;
pub use monitor::*;
pub use telemetry::*;
pub use worker::*;
