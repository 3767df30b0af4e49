//! Risk-assessment pipeline services
//!
//! Leaf first: cache and provider adapter, then the engine that combines
//! them, then the lifecycle manager and batch reconciliation on top.

pub mod alerting;
pub mod analysis_cache;
pub mod analysis_provider_client;
pub mod lifecycle;
pub mod provider;
pub mod reconciliation;
pub mod response_validator;
pub mod risk_engine;
pub mod voice_provider_client;

pub use alerting::{spawn_alert_log_sink, AlertError, Alerter, EventBusAlerter};
pub use analysis_cache::{text_fingerprint, AnalysisCache, Clock, ManualClock, SystemClock};
pub use analysis_provider_client::AnalysisProviderClient;
pub use lifecycle::{ConversationLifecycleManager, LifecycleError, RefreshOutcome};
pub use provider::{
    AnalysisContent, AnalysisProvider, AudioBytes, CallMetadata, CallProvider, CallSummary,
    ProviderError, RecordingLocator, SpeakerRole, TranscriptMessage,
};
pub use reconciliation::{BatchReconciliationEngine, BatchSettings};
pub use risk_engine::{RiskAssessmentEngine, Strategy};
pub use voice_provider_client::VoiceProviderClient;

use callguard_common::events::EventBus;
use std::sync::Arc;

use crate::config::ServiceSettings;
use crate::db::ConversationStore;

/// Fully wired pipeline over a set of collaborators
#[derive(Clone)]
pub struct Pipeline {
    pub cache: Arc<AnalysisCache>,
    pub engine: Arc<RiskAssessmentEngine>,
    pub lifecycle: Arc<ConversationLifecycleManager>,
    pub reconciliation: Arc<BatchReconciliationEngine>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        calls: Arc<dyn CallProvider>,
        analysis: Arc<dyn AnalysisProvider>,
        alerter: Arc<dyn Alerter>,
        cache: Arc<AnalysisCache>,
        event_bus: EventBus,
        settings: &ServiceSettings,
    ) -> Self {
        let engine = Arc::new(RiskAssessmentEngine::new(
            calls.clone(),
            analysis,
            cache.clone(),
            settings.retry_policy,
        ));
        let lifecycle = Arc::new(ConversationLifecycleManager::new(
            store,
            engine.clone(),
            alerter,
            event_bus.clone(),
        ));
        let reconciliation = Arc::new(BatchReconciliationEngine::new(
            lifecycle.clone(),
            calls,
            settings.batch.clone(),
            settings.retry_policy,
            event_bus,
        ));

        Self {
            cache,
            engine,
            lifecycle,
            reconciliation,
        }
    }
}
