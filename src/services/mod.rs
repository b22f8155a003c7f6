// Service modules
pub mod account_service;
pub mod expiration_sweeper;
pub mod inter_service;
pub mod jwt_service;
pub mod ledger_service;
pub mod mercadopago_service;
pub mod order_coordinator;
pub mod order_service;
pub mod payment_service;
pub mod pricing;
pub mod production_gateway;
pub mod settlement_service;

pub use account_service::AccountService;
pub use expiration_sweeper::ExpirationSweeper;
pub use inter_service::InterClient;
pub use jwt_service::JWTService;
pub use ledger_service::LedgerService;
pub use mercadopago_service::MercadoPagoClient;
pub use order_coordinator::OrderCoordinator;
pub use order_service::OrderService;
pub use payment_service::PaymentService;
pub use pricing::Pricing;
pub use production_gateway::{HttpProductionGateway, ProductionGateway};
pub use settlement_service::SettlementService;
