use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxledger::{routes::create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting credit ledger (voxledger)");

    let config = Config::load()?;

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        mercadopago = config.mercadopago.is_some(),
        inter = config.inter.is_some(),
        rate_limited = config.redis.is_some(),
        "Loaded configuration"
    );

    let state = AppState::new(config.clone()).await?;

    if config.database.run_migrations {
        Migrator::up(&state.db, None).await?;
        tracing::info!("Applied pending migrations");
    }

    let sweeper = if config.sweeper.enabled {
        Some(
            state
                .sweeper
                .clone()
                .spawn_schedule(Duration::from_secs(config.sweeper.interval_seconds)),
        )
    } else {
        tracing::warn!("Expiration sweeper disabled; expired batches stay active until swept");
        None
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}

/// `LOG_FORMAT=json` switches to structured output for log shipping
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,voxledger=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
