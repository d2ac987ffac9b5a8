//! `simplebank-store` — Postgres persistence for the ledger.
//!
//! Account, entry and transfer rows, a transaction executor, and the atomic
//! transfer built on top of it. The schema (`accounts`, `entries`,
//! `transfers`) is owned by migration tooling and must already exist.

pub mod config;
pub mod context;
pub mod error;
pub mod queries;
pub mod store;
pub mod transfer;
pub mod tx;

pub use config::{ConfigError, DatabaseConfig};
pub use context::TxContext;
pub use error::{StoreError, StoreResult};
pub use queries::{PoolQueries, Queries};
pub use store::Store;
pub use transfer::apply_transfer;
pub use tx::{TxFuture, TxQueries};
