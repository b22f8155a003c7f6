use entity::{
    payment_intents,
    sea_orm_active_enums::{BatchOrigin, IntentStatus, SettlementOutcome},
};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::json;
use std::{str::FromStr, sync::Arc};
use uuid::Uuid;
use voxledger::{
    config::{CreditsConfig, InterConfig},
    models::payments::{PaymentConfirmation, PaymentStatus, PixPaymentRequest},
    services::{
        inter_service::{InterCallback, InterClient},
        payment_service::ConfirmationOutcome,
        settlement_service::SettleResult,
        LedgerService, PaymentService, SettlementService,
    },
    LedgerError,
};
use wiremock::{
    matchers::{method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

use super::{create_account, setup_test_db};

fn confirmation(
    origin: BatchOrigin,
    external_payment_id: &str,
    status: PaymentStatus,
    amount: &str,
    reference: Option<Uuid>,
) -> PaymentConfirmation {
    PaymentConfirmation {
        origin,
        external_payment_id: external_payment_id.to_string(),
        status,
        amount: Decimal::from_str(amount).unwrap(),
        reference: reference.map(|id| id.to_string()),
        status_detail: None,
    }
}

fn inter_config(api_base: &str, confirm_callbacks: bool) -> InterConfig {
    InterConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        pix_key: "12345678000199".to_string(),
        webhook_token: "callback-token".to_string(),
        api_base: api_base.to_string(),
        certificate_path: None,
        private_key_path: None,
        pix_expiration_minutes: 30,
        request_timeout_ms: 5_000,
        confirm_callbacks,
    }
}

async fn reload_intent(db: &sea_orm::DatabaseConnection, id: Uuid) -> payment_intents::Model {
    payment_intents::Entity::find_by_id(id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

async fn mock_inter_charge(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "inter-token", "expires_in": 3600})),
        )
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/pix/v2/cob/[0-9a-f]{32}$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "txid": "generated",
            "status": "ATIVA",
            "valor": {"original": "10.00"},
            "pixCopiaECola": "00020101021226930014br.gov.bcb.pix"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_webhook_and_polling_converge_on_one_credit() {
    let db = setup_test_db().await;
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, None);
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    let intent = payments
        .create_intent(account, BatchOrigin::PixMercadopago, "credits-100")
        .await
        .unwrap();
    assert_eq!(intent.credits, 100);
    assert_eq!(intent.status, IntentStatus::Pending);

    let approved = confirmation(
        BatchOrigin::PixMercadopago,
        "1319000001",
        PaymentStatus::Approved,
        "10.00",
        Some(intent.id),
    );

    // Webhook first, then the client's polling check reporting the same payment
    let first = payments.handle_confirmation(approved.clone()).await.unwrap();
    assert_eq!(first.label(), "credited");
    assert!(first.batch_id().is_some());

    let second = payments.handle_confirmation(approved).await.unwrap();
    assert_eq!(second.label(), "duplicate_ignored");
    assert_eq!(second.batch_id(), first.batch_id());

    assert_eq!(ledger.get_balance(account).await.unwrap(), 100);

    let intent = reload_intent(&db, intent.id).await;
    assert_eq!(intent.status, IntentStatus::Approved);
    assert_eq!(intent.external_payment_id.as_deref(), Some("1319000001"));

    // A late rejection does not undo an approved purchase
    let late = payments
        .handle_confirmation(confirmation(
            BatchOrigin::PixMercadopago,
            "1319000001",
            PaymentStatus::Rejected,
            "10.00",
            None,
        ))
        .await
        .unwrap();
    assert!(matches!(late, ConfirmationOutcome::Ignored(_)));
    assert_eq!(
        reload_intent(&db, intent.id).await.status,
        IntentStatus::Approved
    );
}

#[tokio::test]
async fn test_purchased_credits_expire_after_validity() {
    let db = setup_test_db().await;
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, None);
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    let intent = payments
        .create_intent(account, BatchOrigin::CardPayment, "credits-500")
        .await
        .unwrap();
    payments
        .handle_confirmation(confirmation(
            BatchOrigin::CardPayment,
            "88001",
            PaymentStatus::Approved,
            "45",
            Some(intent.id),
        ))
        .await
        .unwrap();

    let batches = ledger.list_batches(account).await.unwrap();
    assert_eq!(batches.len(), 1);
    let expires_at = batches[0].expires_at.expect("purchases expire");
    let days = (expires_at - batches[0].created_at).whole_days();
    assert!((364..=365).contains(&days));
}

#[tokio::test]
async fn test_amount_mismatch_rejects_intent_without_credit() {
    let db = setup_test_db().await;
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, None);
    let settlement = SettlementService::new(db.clone());
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    let intent = payments
        .create_intent(account, BatchOrigin::CardPayment, "credits-100")
        .await
        .unwrap();
    let outcome = payments
        .handle_confirmation(confirmation(
            BatchOrigin::CardPayment,
            "77001",
            PaymentStatus::Approved,
            "1.00",
            Some(intent.id),
        ))
        .await
        .unwrap();

    match outcome {
        ConfirmationOutcome::AmountMismatch { expected, received } => {
            assert_eq!(expected, Decimal::from(10));
            assert_eq!(received, Decimal::from(1));
        }
        other => panic!("expected AmountMismatch, got {:?}", other),
    }
    assert_eq!(ledger.get_balance(account).await.unwrap(), 0);
    assert_eq!(
        reload_intent(&db, intent.id).await.status,
        IntentStatus::Rejected
    );

    let record = settlement
        .find_record(BatchOrigin::CardPayment, "77001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.outcome, SettlementOutcome::Rejected);
    assert!(record.rejection_reason.unwrap().contains("amount mismatch"));
}

#[tokio::test]
async fn test_pending_declined_and_unknown_payments() {
    let db = setup_test_db().await;
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, None);
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    let intent = payments
        .create_intent(account, BatchOrigin::PixMercadopago, "credits-100")
        .await
        .unwrap();

    let pending = payments
        .handle_confirmation(confirmation(
            BatchOrigin::PixMercadopago,
            "555",
            PaymentStatus::Pending,
            "10.00",
            Some(intent.id),
        ))
        .await
        .unwrap();
    assert_eq!(pending.label(), "pending");

    // Resolved by the external id attached on the first confirmation
    let cancelled = payments
        .handle_confirmation(confirmation(
            BatchOrigin::PixMercadopago,
            "555",
            PaymentStatus::Cancelled,
            "10.00",
            None,
        ))
        .await
        .unwrap();
    assert!(matches!(
        cancelled,
        ConfirmationOutcome::Declined(PaymentStatus::Cancelled)
    ));
    assert_eq!(
        reload_intent(&db, intent.id).await.status,
        IntentStatus::Cancelled
    );

    // Reference to an intent on another rail does not match
    let unknown = payments
        .handle_confirmation(confirmation(
            BatchOrigin::CardPayment,
            "999",
            PaymentStatus::Approved,
            "10.00",
            Some(intent.id),
        ))
        .await
        .unwrap();
    assert!(matches!(unknown, ConfirmationOutcome::UnknownPayment));
    assert_eq!(ledger.get_balance(account).await.unwrap(), 0);
}

#[tokio::test]
async fn test_intent_validation() {
    let db = setup_test_db().await;
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, None);
    let account = create_account(&db).await;

    assert!(matches!(
        payments
            .create_intent(account, BatchOrigin::PixInter, "credits-7")
            .await,
        Err(LedgerError::InvalidPayment(_))
    ));
    assert!(matches!(
        payments
            .create_intent(account, BatchOrigin::AdminGrant, "credits-100")
            .await,
        Err(LedgerError::InvalidPayment(_))
    ));
    assert!(matches!(
        payments
            .create_intent(Uuid::new_v4(), BatchOrigin::PixInter, "credits-100")
            .await,
        Err(LedgerError::AccountNotFound(_))
    ));

    // Rails without a configured client refuse to start
    let request = PixPaymentRequest {
        package_id: "credits-100".to_string(),
        payer_email: None,
        payer_name: None,
        payer_cpf: None,
    };
    assert!(matches!(
        payments.start_pix_inter(account, &request).await,
        Err(LedgerError::Provider(_))
    ));
}

#[tokio::test]
async fn test_inter_callback_settles_charge_once() {
    let server = MockServer::start().await;
    mock_inter_charge(&server).await;

    let db = setup_test_db().await;
    let inter = Arc::new(InterClient::new(&inter_config(&server.uri(), false)).unwrap());
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, Some(inter));
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    let request = PixPaymentRequest {
        package_id: "credits-100".to_string(),
        payer_email: None,
        payer_name: Some("Maria Silva".to_string()),
        payer_cpf: Some("12345678909".to_string()),
    };
    let (intent, pix) = payments.start_pix_inter(account, &request).await.unwrap();
    assert!(pix.qr_code.starts_with("000201"));
    assert_eq!(pix.expires_in_seconds, Some(1800));
    let txid = intent.external_payment_id.clone().unwrap();

    let callback = || -> InterCallback {
        serde_json::from_value(json!({"pix": [{
            "endToEndId": "E00416968202603011200abcdefghijk",
            "txid": txid,
            "valor": "10.00",
            "horario": "2026-03-01T12:00:00.000Z"
        }]}))
        .unwrap()
    };

    let outcomes = payments
        .handle_inter_callback(Some("callback-token"), callback())
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0],
        ConfirmationOutcome::Settled(SettleResult::Credited { .. })
    ));

    // Inter redelivers
    let outcomes = payments
        .handle_inter_callback(Some("callback-token"), callback())
        .await
        .unwrap();
    assert_eq!(outcomes[0].label(), "duplicate_ignored");
    assert_eq!(ledger.get_balance(account).await.unwrap(), 100);

    assert!(matches!(
        payments
            .handle_inter_callback(Some("wrong"), callback())
            .await,
        Err(LedgerError::InvalidSignature(_))
    ));
}

#[tokio::test]
async fn test_inter_callback_confirms_against_api() {
    let server = MockServer::start().await;
    mock_inter_charge(&server).await;

    let db = setup_test_db().await;
    let inter = Arc::new(InterClient::new(&inter_config(&server.uri(), true)).unwrap());
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, Some(inter));
    let ledger = LedgerService::new(db.clone());
    let account = create_account(&db).await;

    let request = PixPaymentRequest {
        package_id: "credits-100".to_string(),
        payer_email: None,
        payer_name: None,
        payer_cpf: None,
    };
    let (intent, _) = payments.start_pix_inter(account, &request).await.unwrap();
    let txid = intent.external_payment_id.clone().unwrap();

    // The charge is still open at Inter: a forged callback must not credit
    Mock::given(method("GET"))
        .and(path(format!("/pix/v2/cob/{}", txid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "txid": txid,
            "status": "ATIVA",
            "valor": {"original": "10.00"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let forged: InterCallback = serde_json::from_value(json!({"pix": [{
        "endToEndId": "E-forged",
        "txid": txid,
        "valor": "10.00"
    }]}))
    .unwrap();
    let outcomes = payments
        .handle_inter_callback(Some("callback-token"), forged.clone())
        .await
        .unwrap();
    assert_eq!(outcomes[0].label(), "pending");
    assert_eq!(ledger.get_balance(account).await.unwrap(), 0);

    Mock::given(method("GET"))
        .and(path(format!("/pix/v2/cob/{}", txid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "txid": txid,
            "status": "CONCLUIDA",
            "valor": {"original": "10.00"},
            "pix": [{"endToEndId": "E-real", "txid": txid, "valor": "10.00"}]
        })))
        .mount(&server)
        .await;

    let outcomes = payments
        .handle_inter_callback(Some("callback-token"), forged)
        .await
        .unwrap();
    assert_eq!(outcomes[0].label(), "credited");
    assert_eq!(ledger.get_balance(account).await.unwrap(), 100);
}

#[tokio::test]
async fn test_inter_token_request_failure_surfaces_as_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let db = setup_test_db().await;
    let inter = Arc::new(InterClient::new(&inter_config(&server.uri(), false)).unwrap());
    let payments = PaymentService::new(db.clone(), CreditsConfig::default(), None, Some(inter));
    let account = create_account(&db).await;

    let request = PixPaymentRequest {
        package_id: "credits-100".to_string(),
        payer_email: None,
        payer_name: None,
        payer_cpf: None,
    };
    assert!(matches!(
        payments.start_pix_inter(account, &request).await,
        Err(LedgerError::Provider(_))
    ));

    let intent = payment_intents::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Rejected);
}
