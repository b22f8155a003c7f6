use entity::{
    debit_transactions,
    sea_orm_active_enums::{BatchOrigin, BatchStatus, DebitStatus},
};
use sea_orm::{EntityTrait, PaginatorTrait};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use voxledger::{
    services::{ledger_service::ReversalOutcome, LedgerService},
    LedgerError,
};

use super::{create_account, grant, reload_batch, setup_test_db};

#[tokio::test]
async fn test_balance_counts_only_active_unexpired_batches() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    grant(&db, account, 100, Some(now + Duration::days(10))).await;
    grant(&db, account, 40, None).await;
    grant(&db, account, 70, Some(now - Duration::days(1))).await;
    let voided = grant(&db, account, 25, None).await;
    ledger.void_batch(voided.id, "duplicate grant").await.unwrap();

    assert_eq!(ledger.get_balance(account).await.unwrap(), 140);

    // Later than the first batch's expiry, only the never-expiring one is left
    let later = now + Duration::days(11);
    assert_eq!(ledger.get_balance_at(account, later).await.unwrap(), 40);

    // Unknown accounts simply have nothing
    assert_eq!(ledger.get_balance(Uuid::new_v4()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_credit_rejects_non_positive_amounts() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    for amount in [0, -5] {
        let result = ledger
            .credit(account, amount, BatchOrigin::Promotional, None, None)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }
    assert_eq!(ledger.list_batches(account).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_debit_consumes_soonest_expiring_first() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    let never = grant(&db, account, 50, None).await;
    let later = grant(&db, account, 100, Some(now + Duration::days(30))).await;
    let sooner = grant(&db, account, 100, Some(now + Duration::days(2))).await;

    // Smaller than the soonest batch: nothing else is touched
    let result = ledger.debit(account, 60).await.unwrap();
    assert_eq!(result.allocations.len(), 1);
    assert_eq!(result.allocations[0].batch_id, sooner.id);
    assert_eq!(reload_batch(&db, sooner.id).await.amount_consumed, 60);
    assert_eq!(reload_batch(&db, later.id).await.amount_consumed, 0);

    // Spans batches in expiry order, never-expiring last
    let result = ledger.debit(account, 150).await.unwrap();
    let order: Vec<(Uuid, i64)> = result
        .allocations
        .iter()
        .map(|a| (a.batch_id, a.amount))
        .collect();
    assert_eq!(order, vec![(sooner.id, 40), (later.id, 100), (never.id, 10)]);
    assert_eq!(ledger.get_balance(account).await.unwrap(), 40);

    let view = ledger.get_debit(result.debit_id.unwrap()).await.unwrap();
    assert_eq!(view.debit.status, DebitStatus::Committed);
    assert_eq!(view.allocations, result.allocations);
}

#[tokio::test]
async fn test_insufficient_debit_mutates_nothing() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let batch = grant(&db, account, 30, None).await;

    let result = ledger.debit(account, 31).await;
    match result {
        Err(LedgerError::InsufficientCredits {
            available,
            requested,
        }) => {
            assert_eq!(available, 30);
            assert_eq!(requested, 31);
        }
        other => panic!("expected InsufficientCredits, got {:?}", other),
    }

    assert_eq!(reload_batch(&db, batch.id).await.amount_consumed, 0);
    assert_eq!(ledger.get_balance(account).await.unwrap(), 30);
    assert_eq!(debit_transactions::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_zero_and_negative_debits() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    grant(&db, account, 10, None).await;

    let zero = ledger.debit(account, 0).await.unwrap();
    assert!(zero.debit_id.is_none());
    assert!(zero.allocations.is_empty());

    assert!(matches!(
        ledger.debit(account, -1).await,
        Err(LedgerError::InvalidAmount { amount: -1 })
    ));
    assert_eq!(ledger.get_balance(account).await.unwrap(), 10);
}

#[tokio::test]
async fn test_reverse_restores_exact_state() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    let first = grant(&db, account, 20, Some(now + Duration::days(1))).await;
    let second = grant(&db, account, 20, Some(now + Duration::days(5))).await;
    ledger.debit(account, 5).await.unwrap();

    let before = (
        reload_batch(&db, first.id).await.amount_consumed,
        reload_batch(&db, second.id).await.amount_consumed,
        ledger.get_balance(account).await.unwrap(),
    );

    let debit = ledger.debit(account, 25).await.unwrap();
    let debit_id = debit.debit_id.unwrap();
    assert_eq!(ledger.get_balance(account).await.unwrap(), 10);

    let outcome = ledger.reverse(debit_id, Some("test")).await.unwrap();
    assert_eq!(
        outcome,
        ReversalOutcome::Reversed {
            restored: 25,
            forfeited: 0
        }
    );

    let after = (
        reload_batch(&db, first.id).await.amount_consumed,
        reload_batch(&db, second.id).await.amount_consumed,
        ledger.get_balance(account).await.unwrap(),
    );
    assert_eq!(before, after);

    // Repeating restores nothing
    assert_eq!(
        ledger.reverse(debit_id, None).await.unwrap(),
        ReversalOutcome::AlreadyReversed
    );
    assert_eq!(ledger.get_balance(account).await.unwrap(), before.2);

    let view = ledger.get_debit(debit_id).await.unwrap();
    assert_eq!(view.debit.status, DebitStatus::Reversed);
    assert!(view.debit.reversed_at.is_some());
}

/// A drained batch drops out of the balance read and comes back when a
/// reversal gives it capacity again
#[tokio::test]
async fn test_drained_batch_leaves_and_rejoins_balance() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    let drained = grant(&db, account, 30, Some(now + Duration::days(1))).await;
    let spare = grant(&db, account, 10, None).await;

    let debit = ledger.debit(account, 30).await.unwrap();
    assert_eq!(debit.allocations.len(), 1);

    let snapshot = ledger.balance_snapshot(account).await.unwrap();
    assert_eq!(snapshot.available, 10);
    assert_eq!(
        snapshot.batches.iter().map(|b| b.id).collect::<Vec<_>>(),
        vec![spare.id]
    );
    // Still active, just out of the read
    assert_eq!(reload_batch(&db, drained.id).await.status, BatchStatus::Active);

    ledger.reverse(debit.debit_id.unwrap(), None).await.unwrap();
    let snapshot = ledger.balance_snapshot(account).await.unwrap();
    assert_eq!(snapshot.available, 40);
    assert_eq!(snapshot.batches[0].id, drained.id);
}

#[tokio::test]
async fn test_reverse_forfeits_allocations_on_voided_batches() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let now = OffsetDateTime::now_utc();

    let first = grant(&db, account, 10, Some(now + Duration::days(1))).await;
    let second = grant(&db, account, 10, None).await;
    let debit = ledger.debit(account, 15).await.unwrap();

    ledger.void_batch(first.id, "chargeback").await.unwrap();

    let outcome = ledger
        .reverse(debit.debit_id.unwrap(), None)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReversalOutcome::Reversed {
            restored: 5,
            forfeited: 10
        }
    );
    assert_eq!(reload_batch(&db, second.id).await.amount_consumed, 0);
    assert_eq!(ledger.get_balance(account).await.unwrap(), 10);
}

#[tokio::test]
async fn test_void_batch_is_idempotent_and_keeps_history() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let batch = grant(&db, account, 10, None).await;

    let voided = ledger.void_batch(batch.id, "granted by mistake").await.unwrap();
    assert_eq!(voided.status, BatchStatus::Void);
    assert_eq!(voided.void_reason.as_deref(), Some("granted by mistake"));

    let again = ledger.void_batch(batch.id, "other reason").await.unwrap();
    assert_eq!(again.void_reason.as_deref(), Some("granted by mistake"));

    assert_eq!(ledger.list_batches(account).await.unwrap().len(), 1);
    assert!(matches!(
        ledger.void_batch(Uuid::new_v4(), "missing").await,
        Err(LedgerError::BatchNotFound(_))
    ));
}

#[tokio::test]
async fn test_order_debit_records_shortfall_and_finalizes() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    grant(&db, account, 10, None).await;

    assert!(matches!(
        ledger.debit_for_order(account, 11, "order-1").await,
        Err(LedgerError::InsufficientCredits { .. })
    ));
    let shortfall = debit_transactions::Entity::find().all(&db).await.unwrap();
    assert_eq!(shortfall.len(), 1);
    assert_eq!(shortfall[0].status, DebitStatus::InsufficientFunds);
    assert_eq!(shortfall[0].order_ref.as_deref(), Some("order-1"));
    assert_eq!(
        ledger.reverse(shortfall[0].id, None).await.unwrap(),
        ReversalOutcome::NothingToReverse
    );

    let reserved = ledger.debit_for_order(account, 4, "order-2").await.unwrap();
    let debit_id = reserved.debit_id.unwrap();
    assert_eq!(
        ledger.get_debit(debit_id).await.unwrap().debit.status,
        DebitStatus::Pending
    );

    let committed = ledger.finalize(debit_id).await.unwrap();
    assert_eq!(committed.status, DebitStatus::Committed);
    assert_eq!(ledger.finalize(debit_id).await.unwrap().status, DebitStatus::Committed);
    assert_eq!(ledger.get_balance(account).await.unwrap(), 6);
}
