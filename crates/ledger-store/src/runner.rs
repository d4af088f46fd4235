//! Store adapter interface
//!
//! The probe talks to the store under test only through these traits. A
//! [`Runner`] is anything reads and writes can be issued through: a
//! [`Transaction`] handle, or the direct non-transactional handle returned by
//! [`Store::direct`].

use async_trait::async_trait;
use bytes::Bytes;

use ledger_core::{LedgerError, LedgerResult};

/// A key/value pair returned by a scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub key: Bytes,
    pub value: Bytes,
}

impl Row {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Row { key, value }
    }
}

/// Read/write surface shared by transactions and the direct handle
#[async_trait]
pub trait Runner: Send {
    /// Read several keys at once; results are ordered 1:1 with `keys`
    async fn get(&mut self, keys: &[Bytes]) -> LedgerResult<Vec<Option<Bytes>>>;

    /// Write a single key
    async fn put(&mut self, key: Bytes, value: Bytes) -> LedgerResult<()>;

    /// Write several keys as one unit
    async fn put_batch(&mut self, rows: Vec<(Bytes, Bytes)>) -> LedgerResult<()>;

    /// Remove a key
    async fn delete(&mut self, key: Bytes) -> LedgerResult<()>;

    /// Rows with `start <= key < end` in key order, at most `limit` of them
    async fn scan(&mut self, start: &[u8], end: &[u8], limit: usize) -> LedgerResult<Vec<Row>>;

    /// Scan that must return exactly `expected` rows
    async fn scan_exact(
        &mut self,
        start: &[u8],
        end: &[u8],
        expected: usize,
    ) -> LedgerResult<Vec<Row>> {
        let rows = self.scan(start, end, expected).await?;
        if rows.len() < expected {
            return Err(LedgerError::IncompleteScan {
                expected,
                actual: rows.len(),
            });
        }
        Ok(rows)
    }
}

/// An isolated unit of reads and writes
#[async_trait]
pub trait Transaction: Runner {
    /// Apply every buffered write atomically, or fail with `Conflict`
    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}

/// The store under test
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Start a transaction
    async fn begin(&self) -> LedgerResult<Box<dyn Transaction>>;

    /// Handle that issues operations without a transaction
    fn direct(&self) -> Box<dyn Runner>;
}
