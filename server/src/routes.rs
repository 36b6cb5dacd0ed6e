//! Route definitions for the Kalon token API
//!
//! `:variant` is one of `b2c`, `b2b` or `b2ba`.

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::app_state::AppState;
use crate::handlers::*;

// Token lifecycle routes
pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/api/:variant/tokens", post(create_token).get(list_tokens))
        .route(
            "/api/:variant/tokens/:serial",
            get(get_token).put(edit_token).delete(delete_token),
        )
        .route(
            "/api/:variant/codes/:code",
            get(get_token_by_code).delete(delete_token_by_code),
        )
        .route("/api/:variant/codes/:code/redeem", post(redeem_token))
        .route("/api/:variant/codes/:code/extend", put(extend_token))
}

// Report routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/api/:variant/reports/:report_type", get(get_report))
        .route("/api/:variant/rankings", get(get_rankings))
}
