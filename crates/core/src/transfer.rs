//! Transfer request/response types and the balance update ordering rule.
//!
//! A transfer touches two account rows. Concurrent transfers over the same pair
//! would deadlock if one locked `A` then `B` while another locked `B` then `A`,
//! so balance updates are always applied in ascending [`AccountId`] order,
//! whichever side is the source. [`TransferTxParams::balance_updates`] is the
//! single place that ordering is decided.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::AccountId;
use crate::model::{Account, CreateEntry, CreateTransfer, Entry, Transfer};

/// Side of a transfer an account plays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferRole {
    From,
    To,
}

/// Validated request to move `amount` from one account to another.
///
/// Self-transfers and overdrafts are not rejected here; only the amount is
/// checked, so a transfer can never silently do nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

/// One atomic balance increment to apply during a transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub account_id: AccountId,
    pub delta: i64,
    pub role: TransferRole,
}

impl TransferTxParams {
    pub fn new(
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> DomainResult<Self> {
        let params = Self {
            from_account_id,
            to_account_id,
            amount,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.amount <= 0 {
            return Err(DomainError::validation(format!(
                "transfer amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    pub fn transfer_row(&self) -> CreateTransfer {
        CreateTransfer {
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount: self.amount,
        }
    }

    pub fn from_entry(&self) -> CreateEntry {
        CreateEntry {
            account_id: self.from_account_id,
            amount: -self.amount,
        }
    }

    pub fn to_entry(&self) -> CreateEntry {
        CreateEntry {
            account_id: self.to_account_id,
            amount: self.amount,
        }
    }

    /// Both balance increments, smaller account id first.
    ///
    /// For a self-transfer the source update comes first; both hit the same row.
    pub fn balance_updates(&self) -> [BalanceUpdate; 2] {
        let debit = BalanceUpdate {
            account_id: self.from_account_id,
            delta: -self.amount,
            role: TransferRole::From,
        };
        let credit = BalanceUpdate {
            account_id: self.to_account_id,
            delta: self.amount,
            role: TransferRole::To,
        };

        if self.from_account_id <= self.to_account_id {
            [debit, credit]
        } else {
            [credit, debit]
        }
    }
}

/// Everything a committed transfer created or changed.
///
/// `from_account` and `to_account` are the post-transfer rows tagged by role,
/// not by the order in which they were updated. For a self-transfer both hold
/// the same row as it stands after both updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(from: i64, to: i64, amount: i64) -> TransferTxParams {
        TransferTxParams::new(AccountId::new(from), AccountId::new(to), amount).unwrap()
    }

    #[test]
    fn rejects_non_positive_amounts() {
        for amount in [0, -1, i64::MIN] {
            let err = TransferTxParams::new(AccountId::new(1), AccountId::new(2), amount)
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn entries_mirror_the_amount() {
        let p = params(7, 3, 25);
        assert_eq!(
            p.from_entry(),
            CreateEntry {
                account_id: AccountId::new(7),
                amount: -25
            }
        );
        assert_eq!(
            p.to_entry(),
            CreateEntry {
                account_id: AccountId::new(3),
                amount: 25
            }
        );
        assert_eq!(p.transfer_row().amount, 25);
    }

    #[test]
    fn updates_smaller_id_first_when_source_is_smaller() {
        let [first, second] = params(1, 2, 10).balance_updates();
        assert_eq!(
            (first.account_id, first.delta, first.role),
            (AccountId::new(1), -10, TransferRole::From)
        );
        assert_eq!(
            (second.account_id, second.delta, second.role),
            (AccountId::new(2), 10, TransferRole::To)
        );
    }

    #[test]
    fn updates_smaller_id_first_when_destination_is_smaller() {
        let [first, second] = params(2, 1, 10).balance_updates();
        assert_eq!(
            (first.account_id, first.delta, first.role),
            (AccountId::new(1), 10, TransferRole::To)
        );
        assert_eq!(
            (second.account_id, second.delta, second.role),
            (AccountId::new(2), -10, TransferRole::From)
        );
    }

    #[test]
    fn self_transfer_nets_to_zero() {
        let updates = params(5, 5, 10).balance_updates();
        assert!(updates.iter().all(|u| u.account_id == AccountId::new(5)));
        assert_eq!(updates.iter().map(|u| u.delta).sum::<i64>(), 0);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TransferRole::From).unwrap(), "\"from\"");
    }

    proptest! {
        #[test]
        fn opposite_directions_share_lock_order(
            a in 1i64..10_000,
            b in 1i64..10_000,
            amount in 1i64..1_000_000,
        ) {
            prop_assume!(a != b);
            let forward = params(a, b, amount).balance_updates();
            let backward = params(b, a, amount).balance_updates();

            let forward_ids: Vec<_> = forward.iter().map(|u| u.account_id).collect();
            let backward_ids: Vec<_> = backward.iter().map(|u| u.account_id).collect();
            prop_assert_eq!(&forward_ids, &backward_ids);
            prop_assert!(forward_ids[0] < forward_ids[1]);
        }

        #[test]
        fn deltas_balance(a in 1i64..10_000, b in 1i64..10_000, amount in 1i64..1_000_000) {
            let updates = params(a, b, amount).balance_updates();
            prop_assert_eq!(updates[0].delta + updates[1].delta, 0);
            prop_assert_ne!(updates[0].role, updates[1].role);
        }
    }
}
