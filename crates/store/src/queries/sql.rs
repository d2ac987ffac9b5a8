//! Row-level statements.
//!
//! Every function takes a bare `&mut PgConnection` so the same statement runs
//! against a pooled connection (its own implicit transaction) or inside an
//! explicit [`Transaction`](sqlx::Transaction).

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};
use tracing::instrument;

use simplebank_core::{
    Account, AccountId, CreateAccount, CreateEntry, CreateTransfer, Entry, EntryId, Pagination,
    Transfer, TransferId,
};

use crate::error::{map_sqlx_error, StoreError, StoreResult};

/// Cap every later statement of the current transaction, including time spent
/// waiting for row locks, at `timeout`.
///
/// Both settings are `SET LOCAL`, so they end with the transaction and never
/// leak onto the pooled connection. Expiry surfaces as `57014` or `55P03`.
#[instrument(skip(conn), err)]
pub(crate) async fn set_local_timeouts(
    conn: &mut PgConnection,
    timeout: Duration,
) -> StoreResult<()> {
    // Zero disables the timeout in Postgres, so never go below one millisecond.
    let millis = timeout.as_millis().max(1).to_string();

    sqlx::query(
        r#"
        SELECT set_config('statement_timeout', $1, true),
               set_config('lock_timeout', $1, true)
        "#,
    )
    .bind(&millis)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("set_local_timeouts", e))?;

    Ok(())
}

#[instrument(skip(conn), err)]
pub(crate) async fn create_account(
    conn: &mut PgConnection,
    params: &CreateAccount,
) -> StoreResult<Account> {
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        INSERT INTO accounts (owner, balance, currency)
        VALUES ($1, $2, $3)
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(&params.owner)
    .bind(params.balance)
    .bind(&params.currency)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("create_account", e))?;

    Ok(row.into())
}

#[instrument(skip(conn, id), fields(account_id = %id), err(level = "debug"))]
pub(crate) async fn get_account(conn: &mut PgConnection, id: AccountId) -> StoreResult<Account> {
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        WHERE id = $1
        "#,
    )
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("get_account", e))?;

    row.map(Account::from)
        .ok_or_else(|| StoreError::not_found("account", id))
}

/// `balance = balance + delta`, evaluated by Postgres under the row lock.
///
/// The updated row is locked until the surrounding transaction ends.
#[instrument(skip(conn, id), fields(account_id = %id), err)]
pub(crate) async fn add_account_balance(
    conn: &mut PgConnection,
    id: AccountId,
    delta: i64,
) -> StoreResult<Account> {
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        UPDATE accounts
        SET balance = balance + $2
        WHERE id = $1
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(id.get())
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("add_account_balance", e))?;

    row.map(Account::from)
        .ok_or_else(|| StoreError::not_found("account", id))
}

#[instrument(skip(conn), err)]
pub(crate) async fn create_entry(
    conn: &mut PgConnection,
    params: CreateEntry,
) -> StoreResult<Entry> {
    let row = sqlx::query_as::<_, EntryRow>(
        r#"
        INSERT INTO entries (account_id, amount)
        VALUES ($1, $2)
        RETURNING id, account_id, amount, created_at
        "#,
    )
    .bind(params.account_id.get())
    .bind(params.amount)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("create_entry", e))?;

    Ok(row.into())
}

#[instrument(skip(conn, id), fields(entry_id = %id), err(level = "debug"))]
pub(crate) async fn get_entry(conn: &mut PgConnection, id: EntryId) -> StoreResult<Entry> {
    let row = sqlx::query_as::<_, EntryRow>(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE id = $1
        "#,
    )
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("get_entry", e))?;

    row.map(Entry::from)
        .ok_or_else(|| StoreError::not_found("entry", id))
}

#[instrument(skip(conn, account_id), fields(account_id = %account_id), err)]
pub(crate) async fn list_entries(
    conn: &mut PgConnection,
    account_id: AccountId,
    pagination: Pagination,
) -> StoreResult<Vec<Entry>> {
    let rows = sqlx::query_as::<_, EntryRow>(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE account_id = $1
        ORDER BY id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(account_id.get())
    .bind(i64::from(pagination.limit))
    .bind(i64::from(pagination.offset))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("list_entries", e))?;

    Ok(rows.into_iter().map(Entry::from).collect())
}

#[instrument(skip(conn), err)]
pub(crate) async fn create_transfer(
    conn: &mut PgConnection,
    params: CreateTransfer,
) -> StoreResult<Transfer> {
    let row = sqlx::query_as::<_, TransferRow>(
        r#"
        INSERT INTO transfers (from_account_id, to_account_id, amount)
        VALUES ($1, $2, $3)
        RETURNING id, from_account_id, to_account_id, amount, created_at
        "#,
    )
    .bind(params.from_account_id.get())
    .bind(params.to_account_id.get())
    .bind(params.amount)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("create_transfer", e))?;

    Ok(row.into())
}

#[instrument(skip(conn, id), fields(transfer_id = %id), err(level = "debug"))]
pub(crate) async fn get_transfer(
    conn: &mut PgConnection,
    id: TransferId,
) -> StoreResult<Transfer> {
    let row = sqlx::query_as::<_, TransferRow>(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE id = $1
        "#,
    )
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("get_transfer", e))?;

    row.map(Transfer::from)
        .ok_or_else(|| StoreError::not_found("transfer", id))
}

#[instrument(
    skip(conn, from_account_id, to_account_id),
    fields(from = %from_account_id, to = %to_account_id),
    err
)]
pub(crate) async fn list_transfers(
    conn: &mut PgConnection,
    from_account_id: AccountId,
    to_account_id: AccountId,
    pagination: Pagination,
) -> StoreResult<Vec<Transfer>> {
    let rows = sqlx::query_as::<_, TransferRow>(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE from_account_id = $1 AND to_account_id = $2
        ORDER BY id ASC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(from_account_id.get())
    .bind(to_account_id.get())
    .bind(i64::from(pagination.limit))
    .bind(i64::from(pagination.offset))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("list_transfers", e))?;

    Ok(rows.into_iter().map(Transfer::from).collect())
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    id: i64,
    owner: String,
    balance: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            owner: row.try_get("owner")?,
            balance: row.try_get("balance")?,
            currency: row.try_get("currency")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::new(row.id),
            owner: row.owner,
            balance: row.balance,
            currency: row.currency,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct EntryRow {
    id: i64,
    account_id: i64,
    amount: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Entry {
            id: EntryId::new(row.id),
            account_id: AccountId::new(row.account_id),
            amount: row.amount,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct TransferRow {
    id: i64,
    from_account_id: i64,
    to_account_id: i64,
    amount: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransferRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransferRow {
            id: row.try_get("id")?,
            from_account_id: row.try_get("from_account_id")?,
            to_account_id: row.try_get("to_account_id")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<TransferRow> for Transfer {
    fn from(row: TransferRow) -> Self {
        Transfer {
            id: TransferId::new(row.id),
            from_account_id: AccountId::new(row.from_account_id),
            to_account_id: AccountId::new(row.to_account_id),
            amount: row.amount,
            created_at: row.created_at,
        }
    }
}
