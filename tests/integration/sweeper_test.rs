use entity::sea_orm_active_enums::BatchStatus;
use time::{Duration, OffsetDateTime};
use voxledger::services::{ExpirationSweeper, LedgerService};

use super::{create_account, grant, reload_batch, setup_test_db};

#[tokio::test]
async fn test_sweep_then_debit_from_never_expiring_batch() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let sweeper = ExpirationSweeper::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    let stale = grant(&db, account, 100, Some(now - Duration::days(1))).await;
    let lasting = grant(&db, account, 50, None).await;

    let report = sweeper.sweep(now).await.unwrap();
    assert_eq!(report.credits_expired, 100);
    assert_eq!(report.accounts_affected, 1);
    assert_eq!(ledger.get_balance(account).await.unwrap(), 50);

    let stale = reload_batch(&db, stale.id).await;
    assert_eq!(stale.status, BatchStatus::Expired);
    assert_eq!(stale.amount_consumed, stale.amount_added);

    let debit = ledger.debit(account, 30).await.unwrap();
    assert_eq!(debit.allocations.len(), 1);
    assert_eq!(debit.allocations[0].batch_id, lasting.id);
    assert_eq!(ledger.get_balance(account).await.unwrap(), 20);
}

#[tokio::test]
async fn test_second_sweep_expires_nothing() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let sweeper = ExpirationSweeper::new(db.clone());
    let now = OffsetDateTime::now_utc();

    let first = create_account(&db).await;
    let second = create_account(&db).await;
    let partly_used = grant(&db, first, 40, Some(now + Duration::hours(1))).await;
    ledger.debit(first, 15).await.unwrap();
    grant(&db, second, 10, Some(now - Duration::minutes(5))).await;
    grant(&db, second, 10, Some(now + Duration::days(3))).await;

    // Sweep as of two hours from now: the partly used batch has also lapsed
    let at = now + Duration::hours(2);
    let report = sweeper.sweep(at).await.unwrap();
    assert_eq!(report.accounts_affected, 2);
    assert_eq!(report.credits_expired, 25 + 10);

    let again = sweeper.sweep(at).await.unwrap();
    assert_eq!(again.accounts_affected, 0);
    assert_eq!(again.credits_expired, 0);

    let batch = reload_batch(&db, partly_used.id).await;
    assert_eq!(batch.amount_consumed, 40);
    assert_eq!(ledger.get_balance_at(second, at).await.unwrap(), 10);
}

#[tokio::test]
async fn test_sweep_leaves_boundary_and_future_batches() {
    let db = setup_test_db().await;
    let sweeper = ExpirationSweeper::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    let boundary = grant(&db, account, 5, Some(now)).await;
    let future = grant(&db, account, 5, Some(now + Duration::seconds(1))).await;

    // expires_at <= now counts as expired
    let report = sweeper.sweep(now).await.unwrap();
    assert_eq!(report.credits_expired, 5);
    assert_eq!(reload_batch(&db, boundary.id).await.status, BatchStatus::Expired);
    assert_eq!(reload_batch(&db, future.id).await.status, BatchStatus::Active);
}

#[tokio::test]
async fn test_sweep_skips_drained_batches() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let sweeper = ExpirationSweeper::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    let drained = grant(&db, account, 20, Some(now + Duration::minutes(10))).await;
    ledger.debit(account, 20).await.unwrap();

    let report = sweeper.sweep(now + Duration::hours(1)).await.unwrap();
    assert_eq!(report, Default::default());

    // Nothing was left to forfeit, so the batch is not rewritten
    let drained = reload_batch(&db, drained.id).await;
    assert_eq!(drained.status, BatchStatus::Active);
    assert_eq!(drained.amount_consumed, 20);
    assert!(ledger.balance_snapshot(account).await.unwrap().batches.is_empty());
}
