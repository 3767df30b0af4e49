//! Inbound provider events
//!
//! POST /webhooks/call-ended

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::ConversationRecord;
use crate::AppState;

/// Call-ended notification
#[derive(Debug, Deserialize)]
pub struct CallEndedRequest {
    /// Conversation id, or telephony session reference
    pub call_ref: String,
    /// `call_ref` is the conversation id itself
    #[serde(default)]
    pub is_direct_id: bool,
}

/// POST /webhooks/call-ended
///
/// Assesses the conversation and returns the persisted record. 404 when the
/// reference resolves to no conversation.
pub async fn call_ended(
    State(state): State<AppState>,
    Json(request): Json<CallEndedRequest>,
) -> ApiResult<Json<ConversationRecord>> {
    let call_ref = request.call_ref.trim();
    if call_ref.is_empty() {
        return Err(ApiError::BadRequest("call_ref must not be empty".to_string()));
    }

    let cancel = state.request_token();
    let record = state
        .pipeline
        .lifecycle
        .complete_from_provider_event(call_ref, request.is_direct_id, &cancel)
        .await?;

    Ok(Json(record))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/call-ended", post(call_ended))
}
