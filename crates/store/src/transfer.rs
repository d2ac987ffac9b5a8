//! Transfer orchestration.
//!
//! A transfer is one transaction doing, in order:
//!
//! 1. insert the transfer row
//! 2. insert the source entry (`-amount`)
//! 3. insert the destination entry (`+amount`)
//! 4. increment both balances, smaller account id first
//!
//! Step 4 is where row locks are taken. Because every transfer locks its two
//! account rows in the same global order, two transfers over the same pair
//! (in either direction) queue behind each other instead of deadlocking.

use tracing::{debug, instrument};

use simplebank_core::{TransferRole, TransferTxParams, TransferTxResult};

use crate::context::TxContext;
use crate::error::StoreResult;
use crate::queries::Queries;
use crate::store::Store;

impl Store {
    /// Move `params.amount` from one account to another as one atomic unit.
    ///
    /// Non-positive amounts are rejected before a transaction is opened. Any
    /// failure inside the transaction rolls the whole transfer back and is
    /// returned unchanged.
    #[instrument(
        skip(self, ctx, params),
        fields(
            tx_name = ctx.name().unwrap_or("-"),
            from = %params.from_account_id,
            to = %params.to_account_id,
            amount = params.amount
        ),
        err
    )]
    pub async fn transfer_tx(
        &self,
        ctx: &TxContext,
        params: TransferTxParams,
    ) -> StoreResult<TransferTxResult> {
        params.validate()?;

        self.exec_tx(ctx, move |q| Box::pin(apply_transfer(q, params)))
            .await
    }
}

/// Transfer steps against any query handle.
///
/// Callers are expected to run this inside a transaction; [`Store::transfer_tx`]
/// does so.
pub async fn apply_transfer<Q>(q: &mut Q, params: TransferTxParams) -> StoreResult<TransferTxResult>
where
    Q: Queries + ?Sized,
{
    let transfer = q.create_transfer(params.transfer_row()).await?;
    let from_entry = q.create_entry(params.from_entry()).await?;
    let to_entry = q.create_entry(params.to_entry()).await?;

    let [first, second] = params.balance_updates();
    let first_account = q.add_account_balance(first.account_id, first.delta).await?;
    let second_account = q.add_account_balance(second.account_id, second.delta).await?;

    let (from_account, to_account) = if params.from_account_id == params.to_account_id {
        // Both updates hit one row; only the second reflects the whole transfer.
        (second_account.clone(), second_account)
    } else {
        match first.role {
            TransferRole::From => (first_account, second_account),
            TransferRole::To => (second_account, first_account),
        }
    };

    debug!(
        transfer_id = %transfer.id,
        from_balance = from_account.balance,
        to_balance = to_account.balance,
        "transfer applied"
    );

    Ok(TransferTxResult {
        transfer,
        from_entry,
        to_entry,
        from_account,
        to_account,
    })
}
