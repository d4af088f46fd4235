//! Account identity
//!
//! Accounts are addressed by a fixed-width decimal key so that byte-wise key
//! order matches numeric index order. Range scans over `[key(0), key(n))`
//! therefore visit exactly the first `n` accounts.

use std::fmt;

use bytes::Bytes;

use crate::{LedgerError, LedgerResult};

/// Number of decimal digits in an account key
pub const ACCOUNT_ID_WIDTH: usize = 9;

/// Largest encodable account index
pub const MAX_ACCOUNT_INDEX: u64 = 999_999_999;

/// Account identity - index into the ledger
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AccountId(u32);

impl AccountId {
    pub const ZERO: AccountId = AccountId(0);

    /// Create an account ID, rejecting indices that do not fit the key width
    pub fn new(index: u64) -> LedgerResult<Self> {
        if index > MAX_ACCOUNT_INDEX {
            return Err(LedgerError::AccountIndexOutOfRange(index));
        }
        Ok(AccountId(index as u32))
    }

    #[inline]
    pub fn index(self) -> u64 {
        u64::from(self.0)
    }

    /// Store key for this account
    pub fn key(self) -> Bytes {
        Bytes::from(format!("{:0width$}", self.0, width = ACCOUNT_ID_WIDTH))
    }

    /// Parse a store key back into an account ID
    pub fn from_key(key: &[u8]) -> LedgerResult<Self> {
        if key.len() != ACCOUNT_ID_WIDTH || !key.iter().all(u8::is_ascii_digit) {
            return Err(LedgerError::MalformedRecord(format!(
                "invalid account key {:?}",
                String::from_utf8_lossy(key)
            )));
        }

        let index = key
            .iter()
            .fold(0u64, |acc, digit| acc * 10 + u64::from(digit - b'0'));
        AccountId::new(index)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({:0width$})", self.0, width = ACCOUNT_ID_WIDTH)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = ACCOUNT_ID_WIDTH)
    }
}

/// Key range `[start, end)` covering the first `num_accounts` accounts
pub fn ledger_range(num_accounts: u64) -> LedgerResult<(Bytes, Bytes)> {
    Ok((AccountId::ZERO.key(), AccountId::new(num_accounts)?.key()))
}
