use entity::sea_orm_active_enums::{BatchOrigin, SettlementOutcome};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use voxledger::{
    services::{settlement_service::SettleResult, LedgerService, SettlementService},
    LedgerError,
};

use super::{create_account, setup_test_db};

#[tokio::test]
async fn test_settle_credits_once_and_counts_duplicates() {
    let db = setup_test_db().await;
    let settlement = SettlementService::new(db.clone());
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;
    let expires_at = OffsetDateTime::now_utc() + Duration::days(365);

    let first = settlement
        .settle(BatchOrigin::PixMercadopago, "987654321", account, 100, Some(expires_at))
        .await
        .unwrap();
    let batch = match &first {
        SettleResult::Credited { batch, .. } => batch.clone(),
        other => panic!("expected Credited, got {:?}", other),
    };
    assert_eq!(first.outcome(), "credited");
    assert_eq!(batch.origin, BatchOrigin::PixMercadopago);
    assert_eq!(batch.external_payment_id.as_deref(), Some("987654321"));

    for expected_count in 1..=3 {
        let again = settlement
            .settle(BatchOrigin::PixMercadopago, "987654321", account, 100, Some(expires_at))
            .await
            .unwrap();
        match again {
            SettleResult::DuplicateIgnored { record } => {
                assert_eq!(record.duplicate_count, expected_count);
                assert_eq!(record.batch_id, Some(batch.id));
                assert!(record.last_duplicate_at.is_some());
            }
            other => panic!("expected DuplicateIgnored, got {:?}", other),
        }
    }

    assert_eq!(ledger.get_balance(account).await.unwrap(), 100);
}

#[tokio::test]
async fn test_same_external_id_on_different_rails_is_distinct() {
    let db = setup_test_db().await;
    let settlement = SettlementService::new(db.clone());
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    settlement
        .settle(BatchOrigin::CardPayment, "42", account, 10, None)
        .await
        .unwrap();
    let other_rail = settlement
        .settle(BatchOrigin::PixInter, "42", account, 10, None)
        .await
        .unwrap();

    assert_eq!(other_rail.outcome(), "credited");
    assert_eq!(ledger.get_balance(account).await.unwrap(), 20);
}

#[tokio::test]
async fn test_failed_credit_leaves_settlement_retryable() {
    let db = setup_test_db().await;
    let settlement = SettlementService::new(db.clone());
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    let result = settlement
        .settle(BatchOrigin::CardPayment, "mp-555", account, 0, None)
        .await;
    assert!(matches!(result, Err(LedgerError::InvalidAmount { amount: 0 })));

    let record = settlement
        .find_record(BatchOrigin::CardPayment, "mp-555")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.outcome, SettlementOutcome::Rejected);
    assert!(record.batch_id.is_none());

    // A legitimate retry takes the rejected record over
    let retry = settlement
        .settle(BatchOrigin::CardPayment, "mp-555", account, 300, None)
        .await
        .unwrap();
    assert_eq!(retry.outcome(), "credited");
    assert_eq!(ledger.get_balance(account).await.unwrap(), 300);

    let record = settlement
        .find_record(BatchOrigin::CardPayment, "mp-555")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.outcome, SettlementOutcome::Credited);
    assert_eq!(record.amount, 300);
    assert!(record.batch_id.is_some());
}

#[tokio::test]
async fn test_rejection_never_downgrades_credited_record() {
    let db = setup_test_db().await;
    let settlement = SettlementService::new(db.clone());
    let account = create_account(&db).await;

    settlement
        .settle(BatchOrigin::PixInter, "TXN900", account, 50, None)
        .await
        .unwrap();
    let record = settlement
        .record_rejection(BatchOrigin::PixInter, "TXN900", account, 50, "late rejection")
        .await
        .unwrap();

    assert_eq!(record.outcome, SettlementOutcome::Credited);
    assert!(record.rejection_reason.is_none());
}

#[tokio::test]
async fn test_settle_requires_external_id_and_known_account() {
    let db = setup_test_db().await;
    let settlement = SettlementService::new(db.clone());
    let account = create_account(&db).await;

    assert!(matches!(
        settlement
            .settle(BatchOrigin::PixInter, "  ", account, 10, None)
            .await,
        Err(LedgerError::InvalidPayment(_))
    ));
    assert!(matches!(
        settlement
            .settle(BatchOrigin::PixInter, "TXN-ghost", Uuid::new_v4(), 10, None)
            .await,
        Err(LedgerError::AccountNotFound(_))
    ));
}
