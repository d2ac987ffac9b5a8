//! Transaction executor.
//!
//! [`Store::exec_tx`] runs a unit of work against a [`TxQueries`] handle bound to
//! one database transaction:
//!
//! 1. Begin a transaction (database default isolation)
//! 2. Run the closure with the transaction-scoped handle
//! 3. Commit if the closure succeeded, roll back otherwise
//!
//! The closure's value is returned only after a successful commit. If the
//! rollback itself fails, the original error and the rollback error are both
//! reported through [`StoreError::RollbackFailed`].
//!
//! ## Deadlines
//!
//! A deadline on the [`TxContext`] bounds connection checkout and the unit of
//! work. Dropping the closure's future does not stop a statement already sent
//! to Postgres, so the remaining time is also installed as a transaction-local
//! `statement_timeout` and `lock_timeout`. A statement waiting on a row lock is
//! then cancelled by the server and the rollback does not wait for the lock
//! holder.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tokio::time::Instant;
use tracing::{debug, error, info_span, warn, Instrument};

use simplebank_core::{
    Account, AccountId, CreateAccount, CreateEntry, CreateTransfer, Entry, EntryId, Pagination,
    Transfer, TransferId,
};

use crate::context::TxContext;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::queries::{sql, Queries};
use crate::store::Store;

/// Boxed future returned by a unit of work borrowing its [`TxQueries`].
pub type TxFuture<'q, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'q>>;

/// Query handle bound to one open transaction.
///
/// Only reachable from inside [`Store::exec_tx`]; the transaction is committed
/// or rolled back by the executor, never by the closure.
pub struct TxQueries {
    tx: Transaction<'static, Postgres>,
}

impl Store {
    /// Run `work` inside a single database transaction.
    ///
    /// If `ctx` carries a deadline and it passes before `work` finishes, the
    /// work is abandoned, the transaction is rolled back and
    /// [`StoreError::DeadlineExceeded`] is returned. This includes time spent
    /// waiting for a pooled connection and for row locks held by other
    /// transactions. Commit itself is not interrupted.
    pub async fn exec_tx<T, F>(&self, ctx: &TxContext, work: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut TxQueries) -> TxFuture<'q, T> + Send,
    {
        let span = info_span!("tx", tx_name = ctx.name().unwrap_or("-"));

        async move {
            let begin = self.pool().begin();
            let tx = match ctx.deadline() {
                Some(deadline) => tokio::time::timeout_at(deadline, begin)
                    .await
                    .map_err(|_| StoreError::DeadlineExceeded)?,
                None => begin.await,
            }
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
            debug!("transaction started");

            let mut queries = TxQueries { tx };

            let outcome = match ctx.deadline() {
                Some(deadline) => run_until(deadline, &mut queries, work).await,
                None => work(&mut queries).await,
            };

            match outcome {
                Ok(value) => {
                    queries.tx.commit().await.map_err(StoreError::Commit)?;
                    debug!("transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    warn!(error = %err, "rolling back transaction");
                    match queries.tx.rollback().await {
                        Ok(()) => Err(err),
                        Err(rollback) => {
                            error!(error = %err, rollback_error = %rollback, "rollback failed");
                            Err(StoreError::RollbackFailed {
                                original: Box::new(err),
                                rollback,
                            })
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Run `work` with both a client-side and a server-side bound of `deadline`.
async fn run_until<T, F>(deadline: Instant, queries: &mut TxQueries, work: F) -> StoreResult<T>
where
    T: Send,
    F: for<'q> FnOnce(&'q mut TxQueries) -> TxFuture<'q, T> + Send,
{
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(StoreError::DeadlineExceeded);
    }

    let bounded = async {
        sql::set_local_timeouts(&mut queries.tx, remaining).await?;
        work(queries).await
    };

    match tokio::time::timeout_at(deadline, bounded).await {
        Ok(outcome) => outcome,
        Err(_) => Err(StoreError::DeadlineExceeded),
    }
}

#[async_trait]
impl Queries for TxQueries {
    async fn create_account(&mut self, params: &CreateAccount) -> StoreResult<Account> {
        sql::create_account(&mut self.tx, params).await
    }

    async fn get_account(&mut self, id: AccountId) -> StoreResult<Account> {
        sql::get_account(&mut self.tx, id).await
    }

    async fn add_account_balance(&mut self, id: AccountId, delta: i64) -> StoreResult<Account> {
        sql::add_account_balance(&mut self.tx, id, delta).await
    }

    async fn create_entry(&mut self, params: CreateEntry) -> StoreResult<Entry> {
        sql::create_entry(&mut self.tx, params).await
    }

    async fn get_entry(&mut self, id: EntryId) -> StoreResult<Entry> {
        sql::get_entry(&mut self.tx, id).await
    }

    async fn list_entries(
        &mut self,
        account_id: AccountId,
        pagination: Pagination,
    ) -> StoreResult<Vec<Entry>> {
        sql::list_entries(&mut self.tx, account_id, pagination).await
    }

    async fn create_transfer(&mut self, params: CreateTransfer) -> StoreResult<Transfer> {
        sql::create_transfer(&mut self.tx, params).await
    }

    async fn get_transfer(&mut self, id: TransferId) -> StoreResult<Transfer> {
        sql::get_transfer(&mut self.tx, id).await
    }

    async fn list_transfers(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        pagination: Pagination,
    ) -> StoreResult<Vec<Transfer>> {
        sql::list_transfers(&mut self.tx, from_account_id, to_account_id, pagination).await
    }
}
