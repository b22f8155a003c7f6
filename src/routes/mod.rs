// Route modules
pub mod admin;
pub mod credits;
pub mod health;
pub mod orders;
pub mod payments;
pub mod webhooks;

use crate::{
    app_state::AppState,
    middleware::{
        admin_auth_middleware, create_rate_limiter, jwt_auth_middleware, logging_middleware,
    },
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_v1_routes(state.clone()))
        .nest("/webhooks", webhook_routes())
        .layer(middleware::from_fn(logging_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router<AppState> {
    // Routes that open payment intents, rate limited when Redis is configured
    let mut intent_routes = Router::new()
        .route("/payments/card", post(payments::pay_with_card))
        .route(
            "/payments/pix/mercadopago",
            post(payments::create_pix_mercadopago),
        )
        .route("/payments/pix/inter", post(payments::create_pix_inter));
    if let (Some(redis), Some(redis_config)) = (state.redis.clone(), state.config.redis.as_ref()) {
        intent_routes =
            intent_routes.route_layer(middleware::from_fn(create_rate_limiter(redis, redis_config)));
    }

    let account_routes = Router::new()
        .merge(intent_routes)
        .route("/payments/{intent_id}/sync", post(payments::sync_intent))
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/batches", get(credits::list_batches))
        .route("/orders/quote", post(orders::quote))
        .route("/orders", post(orders::place_order))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/accounts", post(admin::create_account))
        .route(
            "/admin/accounts/{account_id}/balance",
            get(admin::account_balance),
        )
        .route("/admin/grants", post(admin::grant_credits))
        .route("/admin/batches/{batch_id}/void", post(admin::void_batch))
        .route("/admin/debits/{debit_id}", get(admin::get_debit))
        .route(
            "/admin/debits/{debit_id}/reverse",
            post(admin::reverse_debit),
        )
        .route(
            "/admin/settlements/{origin}/{external_payment_id}",
            get(admin::get_settlement),
        )
        .route("/admin/sweep", post(admin::sweep))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    Router::new().merge(account_routes).merge(admin_routes)
}

/// Provider callbacks; each handler authenticates its provider
fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/mercadopago", post(webhooks::mercadopago))
        .route("/inter", post(webhooks::inter))
}
