//! Account records
//!
//! Records are stored as JSON objects, `{"balance": 1000}`. Decoding is strict:
//! unknown fields, missing fields and trailing bytes are all malformed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, LedgerResult};

/// A single ledger account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub balance: i64,
}

impl Account {
    #[inline]
    pub fn new(balance: i64) -> Self {
        Account { balance }
    }

    /// Encode to the store value representation
    pub fn encode(&self) -> LedgerResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| LedgerError::MalformedRecord(e.to_string()))
    }

    /// Decode from the store value representation
    pub fn decode(bytes: &[u8]) -> LedgerResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::MalformedRecord(e.to_string()))
    }
}
