use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use voxledger::{
    config::{
        AdminConfig, AuthConfig, Config, CreditsConfig, DatabaseConfig, InterConfig,
        PricingConfig, ProductionConfig, ServerConfig, SweeperConfig,
    },
    routes::create_router,
    AppState,
};

use super::{create_account, grant, orders_test::FakeGateway, setup_test_db};

const ADMIN_KEY: &str = "test-admin-key";

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 10,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
            run_migrations: false,
        },
        redis: None,
        auth: AuthConfig {
            jwt_secret: "integration-secret-with-at-least-32-characters".to_string(),
            issuer: Some("marketplace-auth".to_string()),
            access_token_expiration_minutes: 15,
        },
        admin: AdminConfig {
            api_key: ADMIN_KEY.to_string(),
        },
        credits: CreditsConfig::default(),
        pricing: PricingConfig::default(),
        mercadopago: None,
        inter: Some(InterConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            pix_key: "12345678000199".to_string(),
            webhook_token: "callback-token".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            certificate_path: None,
            private_key_path: None,
            pix_expiration_minutes: 30,
            request_timeout_ms: 1_000,
            confirm_callbacks: true,
        }),
        production: ProductionConfig {
            dispatch_url: "http://127.0.0.1:9/dispatch".to_string(),
            tts_url: "http://127.0.0.1:9/tts".to_string(),
            tts_api_key: None,
            action_timeout_ms: 1_000,
        },
        sweeper: SweeperConfig {
            enabled: false,
            interval_seconds: 60,
        },
    }
}

async fn setup_app() -> (Router, AppState) {
    let db = setup_test_db().await;
    let state =
        AppState::with_connection(test_config(), db, FakeGateway::succeeding()).unwrap();
    (create_router(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get_as(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

fn with_admin_key(mut request: Request<Body>) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-admin-key", ADMIN_KEY.parse().unwrap());
    request
}

#[tokio::test]
async fn test_health_and_request_id() {
    let (app, _) = setup_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_account_routes_require_bearer_token() {
    let (app, _) = setup_app().await;

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/v1/credits/balance")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, body) = send(&app, get_as("/api/v1/credits/balance", "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_balance_lists_batches_soonest_expiry_first() {
    let (app, state) = setup_app().await;
    let account = create_account(&state.db).await;
    let now = time::OffsetDateTime::now_utc();
    grant(&state.db, account, 50, None).await;
    grant(&state.db, account, 20, Some(now + time::Duration::days(2))).await;
    grant(&state.db, account, 99, Some(now - time::Duration::days(1))).await;

    let token = state.jwt_service.generate_token(account).unwrap();
    let (status, body) = send(&app, get_as("/api/v1/credits/balance", &token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accountId"], account.to_string());
    assert_eq!(body["data"]["available"], 70);
    let batches = body["data"]["batches"].as_array().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0]["remaining"], 20);
    assert_eq!(batches[1]["remaining"], 50);
}

#[tokio::test]
async fn test_order_without_credits_answers_payment_required() {
    let (app, state) = setup_app().await;
    let account = create_account(&state.db).await;
    grant(&state.db, account, 3, None).await;
    let token = state.jwt_service.generate_token(account).unwrap();

    let request = with_bearer(
        post_json(
            "/api/v1/orders",
            json!({"action": {"kind": "ai_synthesis", "voiceId": "ana", "text": "Olá, mundo"}}),
        ),
        &token,
    );
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_CREDITS");
    assert_eq!(body["error"]["retryable"], false);
    assert_eq!(state.ledger.get_balance(account).await.unwrap(), 3);
}

#[tokio::test]
async fn test_quote_then_order() {
    let (app, state) = setup_app().await;
    let account = create_account(&state.db).await;
    grant(&state.db, account, 100, None).await;
    let token = state.jwt_service.generate_token(account).unwrap();
    let action = json!({"kind": "ai_synthesis", "voiceId": "ana", "text": "a".repeat(1_500)});

    let (status, body) = send(
        &app,
        with_bearer(post_json("/api/v1/orders/quote", json!({"action": action})), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cost"], 20);
    assert_eq!(body["data"]["sufficient"], true);

    let (status, body) = send(
        &app,
        with_bearer(
            post_json("/api/v1/orders", json!({"quotedCost": 20, "action": action})),
            &token,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "delivered");
    assert_eq!(body["data"]["cost"], 20);
    assert_eq!(state.ledger.get_balance(account).await.unwrap(), 80);

    // Empty text never reaches the ledger
    let (status, _) = send(
        &app,
        with_bearer(
            post_json(
                "/api/v1/orders",
                json!({"action": {"kind": "ai_synthesis", "voiceId": "ana", "text": "  "}}),
            ),
            &token,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_admin_key() {
    let (app, state) = setup_app().await;
    let account = create_account(&state.db).await;
    let grant_body = json!({"accountId": account, "amount": 10, "origin": "promotional"});

    let (status, _) = send(&app, post_json("/api/v1/admin/grants", grant_body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A user token is not an admin key
    let token = state.jwt_service.generate_token(account).unwrap();
    let (status, _) = send(
        &app,
        with_bearer(post_json("/api/v1/admin/grants", grant_body), &token),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(state.ledger.get_balance(account).await.unwrap(), 0);
}

#[tokio::test]
async fn test_admin_grant_void_and_sweep() {
    let (app, state) = setup_app().await;

    let (status, body) = send(
        &app,
        with_admin_key(post_json(
            "/api/v1/admin/accounts",
            json!({"externalRef": "marketplace-user-42", "email": "ana@example.com"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], true);
    let account: Uuid = body["data"]["accountId"].as_str().unwrap().parse().unwrap();

    let (status, body) = send(
        &app,
        with_admin_key(post_json(
            "/api/v1/admin/grants",
            json!({"accountId": account, "amount": 40, "origin": "admin-grant", "expiresInDays": 30}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["remaining"], 40);
    let batch_id = body["data"]["batchId"].as_str().unwrap().to_string();

    // Payment rails are settled, never granted
    let (status, _) = send(
        &app,
        with_admin_key(post_json(
            "/api/v1/admin/grants",
            json!({"accountId": account, "amount": 40, "origin": "pix-inter"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        with_admin_key(post_json(
            &format!("/api/v1/admin/batches/{}/void", batch_id),
            json!({"reason": "chargeback"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "void");
    assert_eq!(state.ledger.get_balance(account).await.unwrap(), 0);

    let (status, body) = send(
        &app,
        with_admin_key(post_json("/api/v1/admin/sweep", json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["creditsExpired"], 0);

    let (status, body) = send(
        &app,
        with_admin_key(
            Request::builder()
                .uri(format!("/api/v1/admin/settlements/pix-inter/{}", "TXN-none"))
                .body(Body::empty())
                .unwrap(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_inter_webhook_rejects_wrong_token() {
    let (app, _) = setup_app().await;
    let callback = json!({"pix": [{"endToEndId": "E1", "txid": "TXN123", "valor": "10.00"}]});

    let (status, body) = send(&app, post_json("/webhooks/inter?token=nope", callback)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_unknown_routes_and_accounts() {
    let (app, state) = setup_app().await;

    let (status, _) = send(
        &app,
        with_admin_key(
            Request::builder()
                .uri(format!("/api/v1/admin/accounts/{}/balance", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let account = create_account(&state.db).await;
    let (status, body) = send(
        &app,
        with_admin_key(
            Request::builder()
                .uri(format!("/api/v1/admin/accounts/{}/balance", account))
                .body(Body::empty())
                .unwrap(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], 0);
}
