//! Row-level operations on accounts, entries and transfers.
//!
//! [`Queries`] is implemented twice:
//!
//! - [`PoolQueries`]: each call checks out a pooled connection, so every
//!   statement is its own implicit transaction.
//! - [`TxQueries`](crate::tx::TxQueries): every call runs on the connection of
//!   one open transaction and shares its atomicity and isolation.

pub(crate) mod sql;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use simplebank_core::{
    Account, AccountId, CreateAccount, CreateEntry, CreateTransfer, Entry, EntryId, Pagination,
    Transfer, TransferId,
};

use crate::error::{map_sqlx_error, StoreResult};

/// Create/read operations plus the atomic balance increment.
#[async_trait]
pub trait Queries: Send {
    async fn create_account(&mut self, params: &CreateAccount) -> StoreResult<Account>;

    /// Returns `NotFound` when no account has this id.
    async fn get_account(&mut self, id: AccountId) -> StoreResult<Account>;

    /// Atomically add `delta` to the account balance and return the updated row.
    ///
    /// The addition is performed by the database in a single `UPDATE`; the
    /// current balance is never read into the application first.
    async fn add_account_balance(&mut self, id: AccountId, delta: i64) -> StoreResult<Account>;

    async fn create_entry(&mut self, params: CreateEntry) -> StoreResult<Entry>;

    async fn get_entry(&mut self, id: EntryId) -> StoreResult<Entry>;

    /// Entries posted against one account, oldest first.
    async fn list_entries(
        &mut self,
        account_id: AccountId,
        pagination: Pagination,
    ) -> StoreResult<Vec<Entry>>;

    async fn create_transfer(&mut self, params: CreateTransfer) -> StoreResult<Transfer>;

    async fn get_transfer(&mut self, id: TransferId) -> StoreResult<Transfer>;

    /// Transfers from one account to another (directed), oldest first.
    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        pagination: Pagination,
    ) -> StoreResult<Vec<Transfer>>;
}

/// Non-transactional handle backed by the connection pool.
#[derive(Debug, Clone)]
pub struct PoolQueries {
    pool: PgPool,
}

impl PoolQueries {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_connection", e))
    }
}

#[async_trait]
impl Queries for PoolQueries {
    async fn create_account(&mut self, params: &CreateAccount) -> StoreResult<Account> {
        let mut conn = self.conn().await?;
        sql::create_account(&mut conn, params).await
    }

    async fn get_account(&mut self, id: AccountId) -> StoreResult<Account> {
        let mut conn = self.conn().await?;
        sql::get_account(&mut conn, id).await
    }

    async fn add_account_balance(&mut self, id: AccountId, delta: i64) -> StoreResult<Account> {
        let mut conn = self.conn().await?;
        sql::add_account_balance(&mut conn, id, delta).await
    }

    async fn create_entry(&mut self, params: CreateEntry) -> StoreResult<Entry> {
        let mut conn = self.conn().await?;
        sql::create_entry(&mut conn, params).await
    }

    async fn get_entry(&mut self, id: EntryId) -> StoreResult<Entry> {
        let mut conn = self.conn().await?;
        sql::get_entry(&mut conn, id).await
    }

    async fn list_entries(
        &mut self,
        account_id: AccountId,
        pagination: Pagination,
    ) -> StoreResult<Vec<Entry>> {
        let mut conn = self.conn().await?;
        sql::list_entries(&mut conn, account_id, pagination).await
    }

    async fn create_transfer(&mut self, params: CreateTransfer) -> StoreResult<Transfer> {
        let mut conn = self.conn().await?;
        sql::create_transfer(&mut conn, params).await
    }

    async fn get_transfer(&mut self, id: TransferId) -> StoreResult<Transfer> {
        let mut conn = self.conn().await?;
        sql::get_transfer(&mut conn, id).await
    }

    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        pagination: Pagination,
    ) -> StoreResult<Vec<Transfer>> {
        let mut conn = self.conn().await?;
        sql::list_transfers(&mut conn, from_account_id, to_account_id, pagination).await
    }
}
