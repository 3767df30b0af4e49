//! Batch reconciliation handlers
//!
//! Both run to completion inside the request; a service shutdown cancels
//! them between groups and the partial report is returned.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::{ImportReport, ValidationReport};
use crate::AppState;

const DEFAULT_IMPORT_LIMIT: usize = 20;
const MAX_IMPORT_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub limit: Option<usize>,
}

/// POST /reconciliation/import?limit=N
pub async fn import_calls(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
) -> ApiResult<Json<ImportReport>> {
    let limit = query.limit.unwrap_or(DEFAULT_IMPORT_LIMIT);
    if limit == 0 || limit > MAX_IMPORT_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_IMPORT_LIMIT
        )));
    }

    let cancel = state.request_token();
    let report = state
        .pipeline
        .reconciliation
        .import_from_provider(limit, &cancel)
        .await?;

    Ok(Json(report))
}

/// POST /reconciliation/validate
pub async fn validate_conversations(
    State(state): State<AppState>,
) -> ApiResult<Json<ValidationReport>> {
    let cancel = state.request_token();
    let report = state
        .pipeline
        .reconciliation
        .validate_against_provider(&cancel)
        .await?;

    Ok(Json(report))
}

pub fn reconciliation_routes() -> Router<AppState> {
    Router::new()
        .route("/reconciliation/import", post(import_calls))
        .route("/reconciliation/validate", post(validate_conversations))
}
