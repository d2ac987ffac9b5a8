//! Page window over an account's entries or a pair's transfers.

use serde::{Deserialize, Serialize};

/// Ledger rows returned when the caller does not ask for a page size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page of ledger rows a single listing returns.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Window into a ledger listing ordered by row id, oldest first.
///
/// `offset` counts rows already seen, so paging forward means adding the
/// previous page's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    /// Clamp an optional caller-supplied window to the supported range.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }

    /// The first `limit` rows.
    pub fn first(limit: u32) -> Self {
        Self {
            limit: limit.min(MAX_PAGE_SIZE),
            offset: 0,
        }
    }

    /// The window directly after this one.
    pub fn next(self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            ..self
        }
    }
}
