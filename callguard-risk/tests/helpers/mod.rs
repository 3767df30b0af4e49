//! Test Helper Utilities
//!
//! Shared fakes and fixtures for callguard-risk integration tests

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{create_file_db, create_memory_store, CountingStore};
pub use fakes::{
    analysis_json, audio_analysis_json, summary, FakeAnalysisProvider, FakeCallProvider,
    RecordingAlerter, Submission,
};

use callguard_common::events::EventBus;
use callguard_risk::config::ServiceSettings;
use callguard_risk::services::{AnalysisCache, ManualClock, Pipeline};
use callguard_risk::utils::RetryPolicy;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Settings with millisecond delays so tests don't sleep for seconds
pub fn fast_settings() -> ServiceSettings {
    let mut settings = ServiceSettings::default();
    settings.retry_policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
    };
    settings.batch.import_group_delay = Duration::from_millis(1);
    settings.batch.validate_group_delay = Duration::from_millis(1);
    settings
}

/// Pipeline over fakes, in-memory SQLite and a manual clock
pub struct TestHarness {
    pub pool: SqlitePool,
    pub store: Arc<CountingStore>,
    pub calls: Arc<FakeCallProvider>,
    pub analysis: Arc<FakeAnalysisProvider>,
    pub alerter: Arc<RecordingAlerter>,
    pub clock: Arc<ManualClock>,
    pub event_bus: EventBus,
    pub pipeline: Pipeline,
}

impl TestHarness {
    pub async fn new(calls: FakeCallProvider, analysis: FakeAnalysisProvider) -> Self {
        Self::with_alerter(calls, analysis, RecordingAlerter::new()).await
    }

    pub async fn with_alerter(
        calls: FakeCallProvider,
        analysis: FakeAnalysisProvider,
        alerter: RecordingAlerter,
    ) -> Self {
        let (pool, store) = create_memory_store().await;
        let store = Arc::new(store);
        let calls = Arc::new(calls);
        let analysis = Arc::new(analysis);
        let alerter = Arc::new(alerter);
        let clock = Arc::new(ManualClock::new());
        let event_bus = EventBus::new(64);
        let settings = fast_settings();

        let cache = Arc::new(AnalysisCache::with_clock(
            settings.cache_ttl,
            settings.cache_capacity,
            clock.clone(),
        ));

        let pipeline = Pipeline::new(
            store.clone(),
            calls.clone(),
            analysis.clone(),
            alerter.clone(),
            cache,
            event_bus.clone(),
            &settings,
        );

        Self {
            pool,
            store,
            calls,
            analysis,
            alerter,
            clock,
            event_bus,
            pipeline,
        }
    }
}
