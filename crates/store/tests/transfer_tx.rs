mod common;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use simplebank_core::{DomainError, Pagination, TransferTxParams};
use simplebank_store::{Queries, StoreError, TxContext};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfer_moves_funds_and_records_ledger() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let account1 = common::create_account(&store, 100).await?;
    let account2 = common::create_account(&store, 100).await?;

    let params = TransferTxParams::new(account1.id, account2.id, 30)?;
    let result = store.transfer_tx(&TxContext::named("tx 1"), params).await?;

    let transfer = &result.transfer;
    assert_eq!(transfer.from_account_id, account1.id);
    assert_eq!(transfer.to_account_id, account2.id);
    assert_eq!(transfer.amount, 30);
    assert!(transfer.id.get() > 0);

    assert_eq!(result.from_entry.account_id, account1.id);
    assert_eq!(result.from_entry.amount, -30);
    assert_eq!(result.to_entry.account_id, account2.id);
    assert_eq!(result.to_entry.amount, 30);

    assert_eq!(result.from_account.id, account1.id);
    assert_eq!(result.from_account.balance, 70);
    assert_eq!(result.to_account.id, account2.id);
    assert_eq!(result.to_account.balance, 130);

    let mut q = store.queries();
    assert_eq!(q.get_transfer(transfer.id).await?, result.transfer);
    assert_eq!(q.get_entry(result.from_entry.id).await?, result.from_entry);
    assert_eq!(q.get_entry(result.to_entry.id).await?, result.to_entry);
    assert_eq!(q.get_account(account1.id).await?.balance, 70);
    assert_eq!(q.get_account(account2.id).await?.balance, 130);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transfers_accumulate_distinct_states() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let account1 = common::create_account(&store, 1_000).await?;
    let account2 = common::create_account(&store, 1_000).await?;

    let n = 5;
    let amount = 10;

    let handles: Vec<_> = (0..n)
        .map(|i| {
            let store = store.clone();
            let params = TransferTxParams::new(account1.id, account2.id, amount).unwrap();
            tokio::spawn(async move {
                let ctx = TxContext::named(format!("tx {}", i + 1));
                store.transfer_tx(&ctx, params).await
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let result = handle.await??;

        assert_eq!(result.transfer.from_account_id, account1.id);
        assert_eq!(result.transfer.to_account_id, account2.id);
        assert_eq!(result.from_account.id, account1.id);
        assert_eq!(result.to_account.id, account2.id);

        let diff1 = account1.balance - result.from_account.balance;
        let diff2 = result.to_account.balance - account2.balance;
        assert_eq!(diff1, diff2);
        assert!(diff1 > 0);
        assert_eq!(diff1 % amount, 0);

        let k = diff1 / amount;
        assert!((1..=n).contains(&k), "k = {k}");
        assert!(seen.insert(k), "balance state {k} observed twice");
    }

    let mut q = store.queries();
    let updated1 = q.get_account(account1.id).await?;
    let updated2 = q.get_account(account2.id).await?;
    assert_eq!(updated1.balance, account1.balance - n * amount);
    assert_eq!(updated2.balance, account2.balance + n * amount);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_direction_transfers_do_not_deadlock() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let account1 = common::create_account(&store, 500).await?;
    let account2 = common::create_account(&store, 500).await?;

    let n = 10;
    let amount = 10;

    let handles: Vec<_> = (0..n)
        .map(|i| {
            let store = store.clone();
            let (from, to) = if i % 2 == 0 {
                (account2.id, account1.id)
            } else {
                (account1.id, account2.id)
            };
            let params = TransferTxParams::new(from, to, amount).unwrap();
            tokio::spawn(async move {
                let ctx = TxContext::named(format!("tx {}", i + 1))
                    .with_timeout(Duration::from_secs(10));
                store.transfer_tx(&ctx, params).await
            })
        })
        .collect();

    for handle in handles {
        handle.await??;
    }

    let mut q = store.queries();
    let updated1 = q.get_account(account1.id).await?;
    let updated2 = q.get_account(account2.id).await?;
    assert_eq!(updated1.balance, account1.balance);
    assert_eq!(updated2.balance, account2.balance);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_transfers_preserve_pair_total() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let a = common::create_account(&store, 300).await?;
    let b = common::create_account(&store, 300).await?;

    let moves = [
        (a.id, b.id, 7),
        (b.id, a.id, 13),
        (a.id, b.id, 29),
        (b.id, a.id, 1),
        (a.id, b.id, 50),
    ];
    let handles: Vec<_> = moves
        .into_iter()
        .map(|(from, to, amount)| {
            let store = store.clone();
            let params = TransferTxParams::new(from, to, amount).unwrap();
            tokio::spawn(async move { store.transfer_tx(&TxContext::new(), params).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await??;
        // Both rows are locked by this transfer when read back, so no other
        // transfer over the pair can be half-applied in this snapshot.
        assert_eq!(result.from_account.balance + result.to_account.balance, 600);
    }

    let mut q = store.queries();
    let a_after = q.get_account(a.id).await?.balance;
    let b_after = q.get_account(b.id).await?.balance;
    assert_eq!(a_after + b_after, 600);
    assert_eq!(a_after, 300 - 7 + 13 - 29 + 1 - 50);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_transfer_has_two_balanced_entries() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let a = common::create_account(&store, 100).await?;
    let b = common::create_account(&store, 100).await?;

    for amount in [5, 15, 25] {
        store
            .transfer_tx(&TxContext::new(), TransferTxParams::new(a.id, b.id, amount)?)
            .await?;
    }

    let mut q = store.queries();
    let transfers = q.list_transfers(a.id, b.id, Pagination::default()).await?;
    let a_entries = q.list_entries(a.id, Pagination::default()).await?;
    let b_entries = q.list_entries(b.id, Pagination::default()).await?;

    assert_eq!(transfers.len(), 3);
    assert_eq!(a_entries.len(), 3);
    assert_eq!(b_entries.len(), 3);

    for ((transfer, debit), credit) in transfers.iter().zip(&a_entries).zip(&b_entries) {
        assert_eq!(debit.account_id, transfer.from_account_id);
        assert_eq!(credit.account_id, transfer.to_account_id);
        assert_eq!(debit.amount, -transfer.amount);
        assert_eq!(credit.amount, transfer.amount);
        assert_eq!(debit.amount + credit.amount, 0);
    }

    // Balance equals the opening balance plus the sum of postings.
    let a_now = q.get_account(a.id).await?;
    assert_eq!(a_now.balance, a.balance + a_entries.iter().map(|e| e.amount).sum::<i64>());
    Ok(())
}

#[tokio::test]
async fn failing_unit_of_work_leaves_nothing_behind() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let a = common::create_account(&store, 100).await?;
    let b = common::create_account(&store, 100).await?;
    let params = TransferTxParams::new(a.id, b.id, 40)?;

    let err = store
        .exec_tx(&TxContext::named("aborted"), move |q| {
            Box::pin(async move {
                simplebank_store::apply_transfer(q, params).await?;
                Err::<(), _>(StoreError::InvalidArgument(DomainError::validation(
                    "abort after apply",
                )))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert!(!err.is_abort_failure());

    let mut q = store.queries();
    assert_eq!(q.get_account(a.id).await?.balance, 100);
    assert_eq!(q.get_account(b.id).await?.balance, 100);
    assert!(q.list_transfers(a.id, b.id, Pagination::default()).await?.is_empty());
    assert!(q.list_entries(a.id, Pagination::default()).await?.is_empty());
    assert!(q.list_entries(b.id, Pagination::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn transfer_to_missing_account_rolls_back() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let a = common::create_account(&store, 100).await?;
    let missing = simplebank_core::AccountId::new(i64::MAX);

    let err = store
        .transfer_tx(&TxContext::new(), TransferTxParams::new(a.id, missing, 10)?)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::ConstraintViolation { .. }), "unexpected error: {err}");
    assert_eq!(store.queries().get_account(a.id).await?.balance, 100);
    assert!(store.queries().list_entries(a.id, Pagination::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn expired_deadline_rolls_back() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let account = common::create_account(&store, 100).await?;
    let id = account.id;

    let ctx = TxContext::named("slow").with_timeout(Duration::from_millis(100));
    let err = store
        .exec_tx(&ctx, move |q| {
            Box::pin(async move {
                q.add_account_balance(id, 50).await?;
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::DeadlineExceeded));
    assert_eq!(store.queries().get_account(id).await?.balance, 100);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_cancels_transfer_waiting_on_row_lock() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let a = common::create_account(&store, 100).await?;
    let b = common::create_account(&store, 100).await?;

    // NO KEY UPDATE leaves the foreign-key inserts free, so the transfer gets
    // as far as its first balance update and waits there.
    let mut holder = store.pool().begin().await?;
    sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR NO KEY UPDATE")
        .bind(a.id.min(b.id).get())
        .execute(&mut *holder)
        .await?;

    let ctx = TxContext::named("blocked").with_timeout(Duration::from_millis(200));
    let started = Instant::now();
    let err = store
        .transfer_tx(&ctx, TransferTxParams::new(a.id, b.id, 10)?)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    holder.rollback().await?;

    assert!(matches!(err, StoreError::DeadlineExceeded), "unexpected error: {err}");
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");

    let mut q = store.queries();
    assert_eq!(q.get_account(a.id).await?.balance, 100);
    assert_eq!(q.get_account(b.id).await?.balance, 100);
    assert!(q.list_transfers(a.id, b.id, Pagination::default()).await?.is_empty());
    assert!(q.list_entries(a.id, Pagination::default()).await?.is_empty());
    assert!(q.list_entries(b.id, Pagination::default()).await?.is_empty());

    // The timeouts were transaction-local; a later transfer is unaffected.
    let result = store
        .transfer_tx(&TxContext::new(), TransferTxParams::new(a.id, b.id, 10)?)
        .await?;
    assert_eq!(result.from_account.balance, 90);
    Ok(())
}

#[tokio::test]
async fn deadline_covers_waiting_for_a_connection() -> anyhow::Result<()> {
    let Some(store) = common::store_with_max_connections(1).await? else {
        return Ok(());
    };
    let account = common::create_account(&store, 100).await?;

    let _busy = store.pool().acquire().await?;

    let ctx = TxContext::named("starved").with_timeout(Duration::from_millis(200));
    let started = Instant::now();
    let err = store
        .exec_tx(&ctx, move |q| {
            Box::pin(async move { q.add_account_balance(account.id, 1).await.map(|_| ()) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::DeadlineExceeded), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[tokio::test]
async fn non_positive_amount_is_rejected() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let a = common::create_account(&store, 100).await?;
    let b = common::create_account(&store, 100).await?;

    // Bypass the validating constructor to check the store guards on its own.
    let params = TransferTxParams {
        from_account_id: a.id,
        to_account_id: b.id,
        amount: 0,
    };
    let err = store.transfer_tx(&TxContext::new(), params).await.unwrap_err();

    assert!(matches!(err, StoreError::InvalidArgument(DomainError::Validation(_))));
    assert!(store.queries().list_transfers(a.id, b.id, Pagination::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn committed_value_is_returned() -> anyhow::Result<()> {
    let Some(store) = common::test_store().await? else {
        return Ok(());
    };
    let account = common::create_account(&store, 10).await?;
    let id = account.id;

    let (before, after) = store
        .exec_tx(&TxContext::new(), move |q| {
            Box::pin(async move {
                let before = q.get_account(id).await?;
                let after = q.add_account_balance(id, 5).await?;
                Ok((before.balance, after.balance))
            })
        })
        .await?;

    assert_eq!((before, after), (10, 15));
    assert!(store.is_healthy().await);
    Ok(())
}
