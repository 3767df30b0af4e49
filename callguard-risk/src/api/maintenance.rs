//! Maintenance endpoints

use axum::{extract::State, routing::delete, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub cleared: usize,
}

/// DELETE /maintenance/cache
pub async fn clear_cache(State(state): State<AppState>) -> Json<CacheClearResponse> {
    let cleared = state.pipeline.cache.clear();
    tracing::info!(cleared, "Analysis cache cleared");
    Json(CacheClearResponse { cleared })
}

pub fn maintenance_routes() -> Router<AppState> {
    Router::new().route("/maintenance/cache", delete(clear_cache))
}
