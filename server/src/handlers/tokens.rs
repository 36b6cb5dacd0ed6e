//! Token CRUD, redemption and extension handlers

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use super::{decode, json_body, parse_kind, parse_serial, query_params};
use crate::app_state::AppState;
use crate::error::LedgerError;
use crate::ledger::{NewToken, Redeemed};
use crate::lifecycle::RedemptionInput;
use crate::models::{ApiResponse, Holder, Token};
use crate::policy::TokenKind;
use crate::store::ListFilter;

type ApiResult<T> = Result<Json<ApiResponse<T>>, LedgerError>;

/// Usage ceiling requested at creation (`numberOfTokens` for agents)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLimits {
    #[serde(default, alias = "numberOfTokens")]
    max_uses: Option<u32>,
}

fn holder_from(kind: TokenKind, body: Value) -> Result<Holder, LedgerError> {
    Ok(match kind {
        TokenKind::Consumer => Holder::Consumer(decode(body)?),
        TokenKind::Business => Holder::Business(decode(body)?),
        TokenKind::Agent => Holder::Agent(decode(body)?),
    })
}

#[derive(Debug, Deserialize)]
pub struct ListTokensQuery {
    pub phone: Option<String>,
}

/// Redemption request body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[validate(length(min = 1, message = "redeemerName is required"))]
    pub redeemer_name: String,
    #[validate(length(min = 1, message = "redeemerPhone is required"))]
    pub redeemer_phone: String,
    #[serde(default)]
    pub redeemer_residence: Option<String>,
    #[serde(default, alias = "billAmount")]
    #[validate(range(min = 0.0, message = "amount must not be negative"))]
    pub amount: Option<f64>,
}

impl RedeemRequest {
    /// Agents must record who redeemed where and for how much.
    fn into_input(self, kind: TokenKind) -> Result<RedemptionInput, LedgerError> {
        self.validate()?;
        let residence = self.redeemer_residence.filter(|r| !r.trim().is_empty());
        if kind == TokenKind::Agent && (residence.is_none() || self.amount.is_none()) {
            return Err(LedgerError::InvalidInput(
                "redeemerResidence and billAmount are required for agent tokens".to_string(),
            ));
        }
        Ok(RedemptionInput {
            redeemer_name: self.redeemer_name,
            redeemer_phone: self.redeemer_phone,
            redeemer_residence: residence,
            amount: self.amount.unwrap_or(0.0),
        })
    }
}

/// Accepts `{"days": 30}` or `{"days": "30"}`.
fn parse_days(body: &Value) -> Result<i64, LedgerError> {
    let days = match body.get("days") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match days {
        Some(d) if d > 0 => Ok(d),
        _ => Err(LedgerError::InvalidInput(
            "Invalid number of days".to_string(),
        )),
    }
}

/// Create a new token
pub async fn create_token(
    State(app_state): State<AppState>,
    Path(variant): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Token>>), LedgerError> {
    let kind = parse_kind(&variant)?;
    let body = json_body(body)?;
    let limits: CreateLimits = decode(body.clone())?;
    let holder = holder_from(kind, body)?;

    let token = app_state
        .ledger
        .create(
            kind,
            NewToken {
                holder,
                max_uses: limits.max_uses,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(token))))
}

/// List tokens of one variant, optionally by holder phone
pub async fn list_tokens(
    State(app_state): State<AppState>,
    Path(variant): Path<String>,
    query: Result<Query<ListTokensQuery>, QueryRejection>,
) -> ApiResult<Vec<Token>> {
    let kind = parse_kind(&variant)?;
    let query = query_params(query)?;
    let filter = ListFilter {
        phone: query.phone.filter(|p| !p.trim().is_empty()),
    };
    let tokens = app_state.ledger.list(kind, &filter).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// Get a single token by serial
pub async fn get_token(
    State(app_state): State<AppState>,
    Path((variant, serial)): Path<(String, String)>,
) -> ApiResult<Token> {
    let kind = parse_kind(&variant)?;
    let token = app_state
        .ledger
        .get_by_serial(kind, parse_serial(&serial)?)
        .await?;
    Ok(Json(ApiResponse::ok(token)))
}

/// Replace holder details of a token
pub async fn edit_token(
    State(app_state): State<AppState>,
    Path((variant, serial)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Token> {
    let kind = parse_kind(&variant)?;
    let body = json_body(body)?;
    let serial = parse_serial(&serial)?;
    let holder = holder_from(kind, body)?;
    let token = app_state.ledger.edit(kind, serial, holder).await?;
    Ok(Json(ApiResponse::ok(token)))
}

/// Permanently delete a token by serial
pub async fn delete_token(
    State(app_state): State<AppState>,
    Path((variant, serial)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind = parse_kind(&variant)?;
    app_state
        .ledger
        .delete_by_serial(kind, parse_serial(&serial)?)
        .await?;
    Ok(Json(ApiResponse::ok("Token deleted".to_string())))
}

/// Get a single token by code
pub async fn get_token_by_code(
    State(app_state): State<AppState>,
    Path((variant, code)): Path<(String, String)>,
) -> ApiResult<Token> {
    let kind = parse_kind(&variant)?;
    let token = app_state.ledger.get_by_code(kind, &code).await?;
    Ok(Json(ApiResponse::ok(token)))
}

/// Permanently delete a token by code
pub async fn delete_token_by_code(
    State(app_state): State<AppState>,
    Path((variant, code)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind = parse_kind(&variant)?;
    app_state.ledger.delete_by_code(kind, &code).await?;
    Ok(Json(ApiResponse::ok("Token deleted".to_string())))
}

/// Redeem a token against a bill
pub async fn redeem_token(
    State(app_state): State<AppState>,
    Path((variant, code)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Redeemed> {
    let kind = parse_kind(&variant)?;
    let body = json_body(body)?;
    let request: RedeemRequest = decode(body)?;
    let redeemed = app_state
        .ledger
        .redeem(kind, &code, request.into_input(kind)?)
        .await?;
    Ok(Json(ApiResponse::ok(redeemed)))
}

/// Push a partner or agent token's expiration date forward
pub async fn extend_token(
    State(app_state): State<AppState>,
    Path((variant, code)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Token> {
    let kind = parse_kind(&variant)?;
    let body = json_body(body)?;
    let days = parse_days(&body)?;
    let token = app_state.ledger.extend(kind, &code, days).await?;
    Ok(Json(ApiResponse::ok(token)))
}
