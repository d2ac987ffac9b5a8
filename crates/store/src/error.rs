//! Store error model.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` by [`map_sqlx_error`]:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (integrity) | `23xxx` | `ConstraintViolation` | Foreign key, unique, check |
//! | Database (data exception) | `22xxx` | `ConstraintViolation` | Out of range, bad data shape |
//! | Database (query canceled) | `57014` | `DeadlineExceeded` | `statement_timeout` fired |
//! | Database (lock not available) | `55P03` | `DeadlineExceeded` | `lock_timeout` fired |
//! | Database (other) | Any other | `Database` | Serialization failure, deadlock, etc. |
//! | Any other | N/A | `Database` | Pool closed, network errors, etc. |
//!
//! Lookups use `fetch_optional`, so a missing row becomes `NotFound` at the call
//! site rather than through `sqlx::Error::RowNotFound`.

use simplebank_core::DomainError;
use thiserror::Error;

/// Result type used across the store.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage and transaction failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lookup by id found no row.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The database rejected the data (foreign key, check, unique, data shape).
    #[error("constraint violation in {operation} ({code}): {message}")]
    ConstraintViolation {
        operation: &'static str,
        code: String,
        message: String,
    },

    /// Input rejected before any statement was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] DomainError),

    /// The unit of work failed and rolling it back failed too.
    ///
    /// The transaction may not have been undone cleanly; this is never retried.
    #[error("tx err: {original}, rb err: {rollback}")]
    RollbackFailed {
        original: Box<StoreError>,
        #[source]
        rollback: sqlx::Error,
    },

    /// Commit failed; none of the unit of work's effects are visible.
    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    /// The caller's deadline elapsed before the unit of work finished.
    #[error("transaction deadline exceeded")]
    DeadlineExceeded,

    #[error("database error in {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when a rollback failed and the transaction may be left inconsistent.
    pub fn is_abort_failure(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }

    /// The failure that caused a rollback, or `self` for any other error.
    pub fn original(&self) -> &StoreError {
        match self {
            Self::RollbackFailed { original, .. } => original,
            other => other,
        }
    }
}

/// SQLSTATEs raised when a transaction-local `statement_timeout` or
/// `lock_timeout` expires.
const TIMEOUT_CODES: [&str; 2] = ["57014", "55P03"];

fn is_timeout_code(code: &str) -> bool {
    TIMEOUT_CODES.contains(&code)
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if is_timeout_code(&code) {
                return StoreError::DeadlineExceeded;
            }
            if code.starts_with("23") || code.starts_with("22") {
                return StoreError::ConstraintViolation {
                    operation,
                    code: code.into_owned(),
                    message: db_err.message().to_string(),
                };
            }
        }
    }

    StoreError::Database {
        operation,
        source: err,
    }
}
