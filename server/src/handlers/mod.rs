//! API handlers for the Kalon token server

mod reports;
mod tokens;

pub use reports::*;
pub use tokens::*;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LedgerError;
use crate::policy::TokenKind;

pub async fn root() -> &'static str {
    "Kalon Salon Token System API Server"
}

pub async fn health_check() -> &'static str {
    "OK"
}

fn parse_kind(variant: &str) -> Result<TokenKind, LedgerError> {
    variant.parse()
}

fn parse_serial(raw: &str) -> Result<i64, LedgerError> {
    match raw.trim().parse::<i64>() {
        Ok(serial) if serial > 0 => Ok(serial),
        _ => Err(LedgerError::InvalidInput(format!(
            "serial must be a positive integer, got '{raw}'"
        ))),
    }
}

/// Deserialize a JSON body, reporting shape errors as invalid input.
fn decode<T: DeserializeOwned>(body: Value) -> Result<T, LedgerError> {
    serde_json::from_value(body).map_err(|e| LedgerError::InvalidInput(e.to_string()))
}

/// Unwrap a JSON body, reporting unparseable payloads inside the response
/// envelope instead of as a bare-text rejection.
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, LedgerError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| LedgerError::InvalidInput(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, LedgerError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| LedgerError::InvalidInput(rejection.body_text()))
}
