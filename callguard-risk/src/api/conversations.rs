//! Conversation API handlers
//!
//! Create, read, refresh and regenerate single conversations, plus the
//! bulk refresh of conversations still missing a transcript.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{BatchRefreshReport, ConversationRecord};
use crate::services::RefreshOutcome;
use crate::AppState;

/// POST /conversations request
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub id: String,
    #[serde(default)]
    pub originator: String,
    #[serde(default)]
    pub telephony_call_ref: Option<String>,
}

/// GET /conversations response
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub total: usize,
    pub conversations: Vec<ConversationRecord>,
}

/// POST /conversations
///
/// Upsert: an existing id is reset to a fresh `active` record.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<ConversationRecord>)> {
    let id = request.id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("id must not be empty".to_string()));
    }

    let correlation = request
        .telephony_call_ref
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let record = state
        .pipeline
        .lifecycle
        .create(id, request.originator.trim(), correlation)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
) -> ApiResult<Json<ConversationListResponse>> {
    let conversations = state.pipeline.lifecycle.list().await?;
    Ok(Json(ConversationListResponse {
        total: conversations.len(),
        conversations,
    }))
}

/// GET /conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationRecord>> {
    Ok(Json(state.pipeline.lifecycle.get(&id).await?))
}

/// POST /conversations/:id/refresh
pub async fn refresh_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RefreshOutcome>> {
    let cancel = state.request_token();
    Ok(Json(state.pipeline.lifecycle.refresh(&id, &cancel).await?))
}

/// POST /conversations/:id/regenerate
///
/// 422 when there is neither a stored transcript nor a fetchable recording.
pub async fn regenerate_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RefreshOutcome>> {
    let cancel = state.request_token();
    Ok(Json(state.pipeline.lifecycle.regenerate(&id, &cancel).await?))
}

/// POST /conversations/batch-refresh
pub async fn batch_refresh(State(state): State<AppState>) -> ApiResult<Json<BatchRefreshReport>> {
    let cancel = state.request_token();
    Ok(Json(state.pipeline.lifecycle.batch_refresh(&cancel).await?))
}

pub fn conversation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/conversations/batch-refresh", post(batch_refresh))
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/refresh", post(refresh_conversation))
        .route("/conversations/:id/regenerate", post(regenerate_conversation))
}
