use anyhow::Context;
use boxoffice_api::{app, AppState};
use boxoffice_core::TicketStore;
use boxoffice_store::{Config, DbClient, PostgresTicketStore, RedisLockCoordinator};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice_api=debug,boxoffice_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    tracing::info!("Starting Boxoffice API on port {}", config.server.port);

    // Redis lock coordinator
    let coordinator = RedisLockCoordinator::new(&config.redis.url, config.locking.backoff())
        .await
        .context("Failed to connect to Redis")?;

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let store = Arc::new(PostgresTicketStore::new(db.pool.clone()));

    let mut seeded = 0;
    for seed in &config.inventory.tickets {
        if store.provision(&seed.to_ticket()).await? {
            seeded += 1;
        }
    }
    if seeded > 0 {
        tracing::info!("Provisioned {} ticket(s) from inventory config", seeded);
    }

    let policy = config.locking.policy();
    tracing::info!(
        wait_timeout_ms = config.locking.wait_timeout_ms,
        lease_timeout_ms = config.locking.lease_timeout_ms,
        key_prefix = %policy.key_prefix,
        "Lock policy loaded"
    );

    let app_state = AppState::new(Arc::new(coordinator), store, policy)
        .map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?;
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
