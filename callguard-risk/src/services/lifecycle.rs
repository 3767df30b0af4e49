//! Conversation lifecycle manager
//!
//! Owns every state change of a `ConversationRecord`: creation, completion
//! from a provider event, refresh, regenerate and the bulk refresh of
//! records that still lack a transcript.
//!
//! Each mutation is assess → merge → upsert. Alerts are emitted after the
//! write and their failure is only logged: the persisted record stands.

use callguard_common::events::{CareEvent, EventBus};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::alerting::Alerter;
use super::provider::{CallSummary, ProviderError};
use super::risk_engine::RiskAssessmentEngine;
use crate::db::ConversationStore;
use crate::models::{
    AssessmentResult, BatchRefreshReport, ConversationRecord, RefreshItem, RefreshStatus,
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Conversation {0} has no transcript and no fetchable recording")]
    NoTranscript(String),

    #[error("Storage error: {0}")]
    Storage(#[from] callguard_common::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// Result of `refresh` / `regenerate`
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub record: ConversationRecord,
    pub transcript_changed: bool,
}

/// Whether an imported call produced a new record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDisposition {
    Created,
    Updated,
}

pub struct ConversationLifecycleManager {
    store: Arc<dyn ConversationStore>,
    engine: Arc<RiskAssessmentEngine>,
    alerter: Arc<dyn Alerter>,
    event_bus: EventBus,
}

impl ConversationLifecycleManager {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        engine: Arc<RiskAssessmentEngine>,
        alerter: Arc<dyn Alerter>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            engine,
            alerter,
            event_bus,
        }
    }

    pub fn engine(&self) -> &Arc<RiskAssessmentEngine> {
        &self.engine
    }

    /// Persist a fresh `active` record; an existing id is overwritten
    pub async fn create(
        &self,
        id: &str,
        originator: &str,
        telephony_call_ref: Option<String>,
    ) -> LifecycleResult<ConversationRecord> {
        let record = ConversationRecord::new(id, originator, telephony_call_ref);
        self.store.upsert(&record).await?;

        tracing::info!(conversation_id = id, "Conversation created");
        self.event_bus.emit_lossy(CareEvent::ConversationCreated {
            conversation_id: id.to_string(),
            timestamp: Utc::now(),
        });

        Ok(record)
    }

    pub async fn get(&self, id: &str) -> LifecycleResult<ConversationRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    /// All records, most recently updated first
    pub async fn list(&self) -> LifecycleResult<Vec<ConversationRecord>> {
        Ok(self.store.list_all().await?)
    }

    /// Handle the end of a call
    ///
    /// `call_ref` is the conversation id when `is_direct_id`, otherwise a
    /// telephony session reference resolved through the store.
    pub async fn complete_from_provider_event(
        &self,
        call_ref: &str,
        is_direct_id: bool,
        cancel: &CancellationToken,
    ) -> LifecycleResult<ConversationRecord> {
        let record = if is_direct_id {
            self.store.find_by_id(call_ref).await?
        } else {
            self.store.find_by_correlation_ref(call_ref).await?
        }
        .ok_or_else(|| LifecycleError::NotFound(call_ref.to_string()))?;

        tracing::info!(
            conversation_id = %record.id,
            call_ref,
            is_direct_id,
            "Call ended, assessing conversation"
        );

        let (record, _) = self.assess_and_persist(record, cancel).await?;

        if record.immediate_intervention {
            self.raise_alert(&record).await;
        }

        Ok(record)
    }

    /// Re-assess an existing record
    pub async fn refresh(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> LifecycleResult<RefreshOutcome> {
        let record = self.get(id).await?;
        let (record, transcript_changed) = self.assess_and_persist(record, cancel).await?;
        Ok(RefreshOutcome {
            record,
            transcript_changed,
        })
    }

    /// Force a fresh analysis
    ///
    /// Rejected with `NoTranscript` before any write when the record has no
    /// stored transcript and the provider has no fetchable recording. A
    /// locator check that could not reach the provider fails with
    /// `Provider(..)`.
    pub async fn regenerate(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> LifecycleResult<RefreshOutcome> {
        let record = self.get(id).await?;

        if !record.has_transcript() && !self.engine.has_fetchable_recording(id, cancel).await? {
            tracing::info!(conversation_id = id, "Regenerate rejected: no source material");
            return Err(LifecycleError::NoTranscript(id.to_string()));
        }

        let known_transcript = record.has_transcript().then_some(record.transcript.as_str());
        self.engine.forget(id, known_transcript);

        let (record, transcript_changed) = self.assess_and_persist(record, cancel).await?;
        Ok(RefreshOutcome {
            record,
            transcript_changed,
        })
    }

    /// Refresh every record without a transcript, one at a time
    pub async fn batch_refresh(&self, cancel: &CancellationToken) -> LifecycleResult<BatchRefreshReport> {
        let pending: Vec<ConversationRecord> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|r| !r.has_transcript())
            .collect();

        tracing::info!(count = pending.len(), "Batch refresh started");

        let mut report = BatchRefreshReport::default();
        for record in pending {
            let conversation_id = record.id.clone();
            let item = match self.assess_and_persist(record, cancel).await {
                Ok((_, true)) => RefreshItem {
                    conversation_id,
                    status: RefreshStatus::Updated,
                    message: None,
                },
                Ok((_, false)) => RefreshItem {
                    conversation_id,
                    status: RefreshStatus::Skipped,
                    message: Some("no new transcript".to_string()),
                },
                Err(err) => {
                    tracing::warn!(conversation_id = %conversation_id, error = %err, "Batch refresh item failed");
                    RefreshItem {
                        conversation_id,
                        status: RefreshStatus::Failed,
                        message: Some(err.to_string()),
                    }
                }
            };
            report.push(item);
        }

        tracing::info!(
            total = report.total,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Batch refresh complete"
        );
        self.event_bus.emit_lossy(CareEvent::BatchCompleted {
            operation: "refresh".to_string(),
            total: report.total,
            failed: report.failed,
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    /// Assess one call from the provider listing and upsert its record
    ///
    /// An existing record keeps its creation time and correlation reference.
    /// Alerts only when this assessment newly sets the intervention flag.
    pub async fn import_call(
        &self,
        call: &CallSummary,
        call_id: &str,
        cancel: &CancellationToken,
    ) -> LifecycleResult<(ConversationRecord, ImportDisposition)> {
        let existing = self.store.find_by_id(call_id).await?;
        let disposition = if existing.is_some() {
            ImportDisposition::Updated
        } else {
            ImportDisposition::Created
        };

        let mut record = existing.unwrap_or_else(|| {
            ConversationRecord::new(
                call_id,
                call.originator.as_deref().unwrap_or_default(),
                call.telephony_call_ref.clone(),
            )
        });
        if record.telephony_call_ref.is_none() {
            record.telephony_call_ref = call.telephony_call_ref.clone();
        }
        if record.originator.is_empty() {
            if let Some(originator) = &call.originator {
                record.originator = originator.clone();
            }
        }
        let was_flagged = record.immediate_intervention;

        let (record, _) = self.assess_and_persist(record, cancel).await?;

        if record.immediate_intervention && !was_flagged {
            self.raise_alert(&record).await;
        }

        Ok((record, disposition))
    }

    async fn assess_and_persist(
        &self,
        mut record: ConversationRecord,
        cancel: &CancellationToken,
    ) -> LifecycleResult<(ConversationRecord, bool)> {
        let known_transcript = record.has_transcript().then_some(record.transcript.as_str());
        let result: AssessmentResult = self.engine.assess(&record.id, known_transcript, cancel).await?;

        let transcript_changed = record.apply_assessment(&result);
        self.store.upsert(&record).await?;

        tracing::info!(
            conversation_id = %record.id,
            risk_level = %record.risk_level,
            risk_score = record.risk_score,
            lifecycle_status = record.lifecycle_status.as_str(),
            transcript_changed,
            "Conversation assessment persisted"
        );
        self.event_bus.emit_lossy(CareEvent::ConversationAssessed {
            conversation_id: record.id.clone(),
            risk_level: record.risk_level.as_str().to_string(),
            risk_score: record.risk_score,
            source: result.source.as_str().to_string(),
            timestamp: Utc::now(),
        });

        Ok((record, transcript_changed))
    }

    async fn raise_alert(&self, record: &ConversationRecord) {
        if let Err(err) = self.alerter.notify(&record.id, record.risk_level).await {
            tracing::error!(
                conversation_id = %record.id,
                risk_level = %record.risk_level,
                error = %err,
                "Alert delivery failed; assessment remains persisted"
            );
        }
    }
}
