//! Ledger Core - Fundamental types for the ledger probe
//!
//! This crate defines the ledger model the probe drives against a store:
//! - Account identifiers and their order-preserving keys
//! - Account records and their value encoding
//! - The transfer decision
//! - The error taxonomy shared by every other crate

pub mod account;
pub mod error;
pub mod id;
pub mod transfer;

pub use account::*;
pub use error::*;
pub use id::*;
pub use transfer::*;
