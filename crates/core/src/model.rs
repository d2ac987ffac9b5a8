//! Ledger rows: accounts, entries and transfers.
//!
//! These are plain values copied out of the store. Nothing here holds a
//! connection or transaction, so a row read inside one transaction can be
//! returned to a caller after that transaction has finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AccountId, EntryId, TransferId};

/// An account and its current balance in minor currency units.
///
/// `balance` always equals the opening balance plus the sum of every entry
/// posted against the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// One signed posting against one account.
///
/// Negative for the source leg of a transfer, positive for the destination leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Record of funds moved from one account to another.
///
/// Every transfer is backed by exactly two entries: `-amount` on
/// `from_account_id` and `+amount` on `to_account_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccount {
    pub owner: String,
    /// Opening balance.
    pub balance: i64,
    pub currency: String,
}

/// Input for appending an entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntry {
    pub account_id: AccountId,
    pub amount: i64,
}

/// Input for recording a transfer row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}
