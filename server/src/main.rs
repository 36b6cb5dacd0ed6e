//! Kalon Token Server
//!
//! REST backend for the salon referral-token program: token creation,
//! redemption, extension and status reports for consumer, partner and agent
//! tokens.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use kalon_token_server::config::Config;
use kalon_token_server::store::{MemoryStore, PgStore, TokenStore};
use kalon_token_server::{build_router, sweeper, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kalon_token_server=debug")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let store: Arc<dyn TokenStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .context("failed to connect to database")?;
            tracing::info!("Database connected successfully");
            Arc::new(PgStore::new(Arc::new(db_pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, tokens are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let app_state = AppState::with_store(store);

    if let Some(every) = config.sweep_interval {
        let ledger = app_state.ledger.clone();
        tokio::spawn(async move {
            tracing::info!(interval_secs = every.as_secs(), "Status sweeper task started");
            sweeper::run(ledger, every).await;
        });
    }

    let app = build_router(app_state).layer(configure_cors(&config)?);

    let addr = config.socket_addr();
    tracing::info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn configure_cors(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.cors_allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return Ok(CorsLayer::permissive());
    }

    let origins = config
        .cors_allowed_origins
        .iter()
        .map(|s| {
            s.parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin '{s}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}
