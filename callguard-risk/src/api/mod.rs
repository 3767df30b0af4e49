//! HTTP API handlers for callguard-risk
//!
//! JSON only. Handlers translate requests into lifecycle / reconciliation
//! calls and map their errors through `ApiError`.

pub mod conversations;
pub mod health;
pub mod maintenance;
pub mod reconciliation;
pub mod webhooks;

pub use conversations::conversation_routes;
pub use health::health_routes;
pub use maintenance::maintenance_routes;
pub use reconciliation::reconciliation_routes;
pub use webhooks::webhook_routes;
