//! Shared transfer counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts committed and skipped transfers across all workers.
///
/// Reporting only: nothing about ledger correctness depends on these values.
#[derive(Debug, Default)]
pub struct TransferCounter {
    applied: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of a [`TransferCounter`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferCounts {
    pub applied: u64,
    pub skipped: u64,
}

impl TransferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed transfer; returns the new total
    #[inline]
    pub fn record_applied(&self) -> u64 {
        self.applied.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a transfer skipped for insufficient funds
    #[inline]
    pub fn record_skipped(&self) -> u64 {
        self.skipped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TransferCounts {
        TransferCounts {
            applied: self.applied(),
            skipped: self.skipped(),
        }
    }
}
