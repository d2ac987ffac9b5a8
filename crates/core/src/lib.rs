//! `simplebank-core` — ledger domain types.
//!
//! This crate contains **pure domain** values (no infrastructure concerns):
//! row models, identifiers, transfer parameters and the lock ordering rule.

pub mod error;
pub mod id;
pub mod model;
pub mod pagination;
pub mod transfer;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, EntryId, TransferId};
pub use model::{Account, CreateAccount, CreateEntry, CreateTransfer, Entry, Transfer};
pub use pagination::Pagination;
pub use transfer::{BalanceUpdate, TransferRole, TransferTxParams, TransferTxResult};
