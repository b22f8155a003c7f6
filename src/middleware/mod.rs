// Middleware modules
pub mod admin_auth;
pub mod jwt_auth;
pub mod logging;
pub mod rate_limit;

pub use admin_auth::admin_auth_middleware;
pub use jwt_auth::{jwt_auth_middleware, AccountIdentity};
pub use logging::logging_middleware;
pub use rate_limit::create_rate_limiter;
