//! Ledger Test Harness - Fixtures and stress runs for the ledger probe
//!
//! This crate provides:
//! - Deterministic ledger fixtures for scenario tests
//! - A bounded stress harness that collects invariant violations
//! - Criterion benchmarks of the transfer path

pub mod scenario;
pub mod stress;

pub use scenario::*;
pub use stress::*;
