//! Ledger Store - The store adapter the probe drives
//!
//! This crate defines what the probe needs from a transactional key-value
//! store and ships an in-process implementation of it:
//! - Runner, Transaction and Store traits
//! - The retrying atomic execution wrapper
//! - A multi-version in-memory store with snapshot reads, optimistic commit
//!   validation, injected latency and injected faults

pub mod atomic;
pub mod memory;
pub mod mvcc;
pub mod runner;

pub use atomic::*;
pub use memory::*;
pub use runner::*;
