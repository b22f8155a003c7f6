use crate::{
    config::Config,
    services::{
        AccountService, ExpirationSweeper, HttpProductionGateway, InterClient, JWTService,
        LedgerService, MercadoPagoClient, OrderCoordinator, OrderService, PaymentService, Pricing,
        ProductionGateway, SettlementService,
    },
};
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    /// Present only when rate limiting is configured
    pub redis: Option<Arc<redis::Client>>,
    pub jwt_service: Arc<JWTService>,
    pub ledger: LedgerService,
    pub account_service: Arc<AccountService>,
    pub settlement_service: Arc<SettlementService>,
    pub payment_service: Arc<PaymentService>,
    pub order_service: Arc<OrderService>,
    pub sweeper: ExpirationSweeper,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let mut options = ConnectOptions::new(config.database.url.clone());
        if let Some(max) = config.database.max_connections {
            options.max_connections(max);
        }
        options.sqlx_logging(false);
        let db = sea_orm::Database::connect(options).await?;

        let gateway: Arc<dyn ProductionGateway> =
            Arc::new(HttpProductionGateway::new(&config.production)?);

        Self::with_connection(config, db, gateway)
    }

    /// Build the state over an existing connection and production gateway
    pub fn with_connection(
        config: Config,
        db: DatabaseConnection,
        gateway: Arc<dyn ProductionGateway>,
    ) -> Result<Self, anyhow::Error> {
        let redis = match &config.redis {
            Some(redis) => Some(Arc::new(redis::Client::open(redis.url.as_str())?)),
            None => None,
        };

        let mercadopago = match &config.mercadopago {
            Some(cfg) => Some(Arc::new(MercadoPagoClient::new(cfg)?)),
            None => None,
        };
        let inter = match &config.inter {
            Some(cfg) => Some(Arc::new(InterClient::new(cfg)?)),
            None => None,
        };

        let jwt_service = Arc::new(JWTService::new(Arc::new(config.auth.clone())));
        let ledger = LedgerService::new(db.clone());
        let account_service = Arc::new(AccountService::new(db.clone()));
        let settlement_service = Arc::new(SettlementService::new(db.clone()));
        let payment_service = Arc::new(PaymentService::new(
            db.clone(),
            config.credits.clone(),
            mercadopago,
            inter,
        ));
        let coordinator = OrderCoordinator::new(
            ledger.clone(),
            Duration::from_millis(config.production.action_timeout_ms),
        );
        let order_service = Arc::new(OrderService::new(
            db.clone(),
            Pricing::new(config.pricing.clone()),
            coordinator,
            gateway,
        ));
        let sweeper = ExpirationSweeper::new(db.clone());

        Ok(Self {
            db,
            redis,
            jwt_service,
            ledger,
            account_service,
            settlement_service,
            payment_service,
            order_service,
            sweeper,
            config: Arc::new(config),
        })
    }
}
