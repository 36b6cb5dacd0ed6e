//! Report handlers

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};

use super::{parse_kind, query_params};
use crate::app_state::AppState;
use crate::error::LedgerError;
use crate::models::{ApiResponse, PaginationParams};
use crate::report::{Rankings, Report, ReportFilter};

/// Status report for one variant (`all`, `active`, `expired`, `reissued`)
pub async fn get_report(
    State(app_state): State<AppState>,
    Path((variant, report_type)): Path<(String, String)>,
    pagination: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<Json<ApiResponse<Report>>, LedgerError> {
    let kind = parse_kind(&variant)?;
    let pagination = query_params(pagination)?;
    let filter: ReportFilter = report_type.parse()?;
    let report = app_state.ledger.report(kind, filter, pagination).await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// Holders ranked by total business
pub async fn get_rankings(
    State(app_state): State<AppState>,
    Path(variant): Path<String>,
) -> Result<Json<ApiResponse<Rankings>>, LedgerError> {
    let kind = parse_kind(&variant)?;
    let rankings = app_state.ledger.rankings(kind).await?;
    Ok(Json(ApiResponse::ok(rankings)))
}
