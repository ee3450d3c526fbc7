//! PsycheConecta server
//!
//! Usage: `psycheconecta [config.yml]`

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use psycheconecta::{
    api::{self, AppState},
    config::Config,
    db::{self, DynDatabasePool},
};

/// Interval of the rate limiter and session cleanup task
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "psycheconecta=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PsycheConecta...");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    let pool = connect(&config).await;
    let state = AppState::build(&config, pool);

    spawn_cleanup_task(state.clone());

    let app = api::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);
    if config.server.trust_proxy {
        tracing::info!("Client IPs are taken from forwarding headers");
    }

    // Peer addresses feed the per-IP login limit
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Open the pool and migrate. Any failure leaves the server on demo data.
async fn connect(config: &Config) -> Option<DynDatabasePool> {
    if !config.database.is_configured() {
        tracing::warn!("No database configured, serving the demo catalog");
        return None;
    }

    let pool = match db::create_pool(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!("Database unavailable, serving the demo catalog: {:#}", e);
            return None;
        }
    };
    tracing::info!("Database connected: {:?}", config.database.driver);

    match db::migrations::run_migrations(&pool).await {
        Ok(applied) => {
            tracing::info!("Database migrations completed ({} applied)", applied);
            Some(pool)
        }
        Err(e) => {
            tracing::warn!("Migrations failed, serving the demo catalog: {:#}", e);
            None
        }
    }
}

/// Prune the login rate limiter and expired sessions every 5 minutes
fn spawn_cleanup_task(state: AppState) {
    let limiter = Arc::clone(&state.rate_limiter);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            limiter.cleanup().await;

            if let Some(store) = &state.store {
                match store.user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Removed {} expired sessions", n),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        }
    });
}
