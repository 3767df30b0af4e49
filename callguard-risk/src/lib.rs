//! callguard-risk library interface
//!
//! Risk-assessment orchestration core plus its HTTP surface. Exposed as a
//! library so integration tests can assemble the pipeline with fakes.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use callguard_common::events::EventBus;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::services::Pipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub pipeline: Pipeline,
    /// Cancelled on shutdown; request-scoped tokens are children of it
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, pipeline: Pipeline) -> Self {
        Self {
            db,
            event_bus,
            pipeline,
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
        }
    }

    /// Token for one request's work
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::webhook_routes())
        .merge(api::conversation_routes())
        .merge(api::reconciliation_routes())
        .merge(api::maintenance_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
