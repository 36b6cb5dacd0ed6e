//! Kalon Salon token ledger
//!
//! Issues, redeems and reports on referral tokens of three kinds: consumer
//! (B2C), business partner (B2B) and agent (B2BA). The lifecycle rules live in
//! [`lifecycle`] and [`policy`]; [`ledger`] applies them against a
//! [`store::TokenStore`]; [`routes`] exposes them over HTTP.

pub mod app_state;
pub mod codes;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod policy;
pub mod report;
pub mod routes;
pub mod store;
pub mod sweeper;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use app_state::AppState;
pub use error::LedgerError;
pub use ledger::LedgerService;

/// Assemble the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(routes::token_routes())
        .merge(routes::report_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
