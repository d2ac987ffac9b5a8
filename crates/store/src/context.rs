//! Per-call execution context.

use std::time::Duration;

use tokio::time::Instant;

/// Request-scoped values carried into a transaction.
///
/// `name` is only recorded on the transaction's tracing span; the store never
/// branches on it. `deadline` bounds how long the unit of work may run before
/// the transaction is rolled back.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    name: Option<String>,
    deadline: Option<Instant>,
}

impl TxContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
