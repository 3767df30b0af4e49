//! Batch reconciliation against the voice provider
//!
//! Two bulk operations over the provider's authoritative call list:
//!
//! - **import**: list recent calls, assess each, upsert a record per call
//! - **validate**: check every stored record still exists upstream
//!
//! Both work in fixed-size groups. Calls within a group run concurrently,
//! a short pause separates groups, and the cancellation token is checked
//! before each group. One item's failure never aborts the batch.

use callguard_common::events::{CareEvent, EventBus};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::lifecycle::{ConversationLifecycleManager, ImportDisposition, LifecycleResult};
use super::provider::{CallProvider, CallSummary, ProviderError};
use crate::models::{
    ImportItem, ImportReport, ImportStatus, ValidationItem, ValidationReport, ValidationStatus,
};
use crate::utils::retry::{retry_with_backoff, RetryPolicy};

/// Group sizes and pauses for bulk operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub import_group_size: usize,
    pub import_group_delay: Duration,
    pub validate_group_size: usize,
    pub validate_group_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            import_group_size: 5,
            import_group_delay: Duration::from_secs(1),
            validate_group_size: 10,
            validate_group_delay: Duration::from_millis(500),
        }
    }
}

pub struct BatchReconciliationEngine {
    lifecycle: Arc<ConversationLifecycleManager>,
    calls: Arc<dyn CallProvider>,
    settings: BatchSettings,
    retry_policy: RetryPolicy,
    event_bus: EventBus,
}

impl BatchReconciliationEngine {
    pub fn new(
        lifecycle: Arc<ConversationLifecycleManager>,
        calls: Arc<dyn CallProvider>,
        settings: BatchSettings,
        retry_policy: RetryPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            lifecycle,
            calls,
            settings,
            retry_policy,
            event_bus,
        }
    }

    /// Import up to `limit` recent provider calls
    ///
    /// Fails as a whole only when the listing itself fails.
    pub async fn import_from_provider(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, ProviderError> {
        let calls = retry_with_backoff("list calls", &self.retry_policy, cancel, || {
            self.calls.list_calls(limit)
        })
        .await?;

        let mut report = ImportReport {
            requested_limit: limit,
            listed: calls.len(),
            ..Default::default()
        };

        tracing::info!(limit, listed = calls.len(), "Provider import started");

        let group_size = self.settings.import_group_size.max(1);
        for (index, group) in calls.chunks(group_size).enumerate() {
            if index > 0 && !pause(self.settings.import_group_delay, cancel).await {
                report.cancelled = true;
                break;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let items = join_all(group.iter().map(|call| self.import_one(call, cancel))).await;
            for item in items {
                report.push(item);
            }
        }

        tracing::info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            "Provider import complete"
        );
        self.event_bus.emit_lossy(CareEvent::BatchCompleted {
            operation: "import".to_string(),
            total: report.items.len(),
            failed: report.failed,
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    async fn import_one(&self, call: &CallSummary, cancel: &CancellationToken) -> ImportItem {
        let Some(call_id) = call.id.as_deref() else {
            return ImportItem {
                conversation_id: None,
                status: ImportStatus::Skipped,
                risk_level: None,
                message: Some("provider entry has no call id".to_string()),
            };
        };

        let outcome: LifecycleResult<_> = self.lifecycle.import_call(call, call_id, cancel).await;
        match outcome {
            Ok((record, disposition)) => ImportItem {
                conversation_id: Some(call_id.to_string()),
                status: match disposition {
                    ImportDisposition::Created => ImportStatus::Created,
                    ImportDisposition::Updated => ImportStatus::Updated,
                },
                risk_level: Some(record.risk_level),
                message: None,
            },
            Err(err) => {
                tracing::warn!(conversation_id = call_id, error = %err, "Import of call failed");
                ImportItem {
                    conversation_id: Some(call_id.to_string()),
                    status: ImportStatus::Failed,
                    risk_level: None,
                    message: Some(err.to_string()),
                }
            }
        }
    }

    /// Check every stored conversation against the provider
    pub async fn validate_against_provider(
        &self,
        cancel: &CancellationToken,
    ) -> LifecycleResult<ValidationReport> {
        let ids: Vec<String> = self
            .lifecycle
            .list()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut report = ValidationReport {
            total: ids.len(),
            ..Default::default()
        };

        tracing::info!(total = ids.len(), "Provider validation started");

        let group_size = self.settings.validate_group_size.max(1);
        for (index, group) in ids.chunks(group_size).enumerate() {
            if index > 0 && !pause(self.settings.validate_group_delay, cancel).await {
                report.cancelled = true;
                break;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let items = join_all(group.iter().map(|id| self.validate_one(id, cancel))).await;
            for item in items {
                report.push(item);
            }
        }

        tracing::info!(
            valid = report.valid,
            invalid = report.invalid,
            errors = report.errors,
            cancelled = report.cancelled,
            "Provider validation complete"
        );
        self.event_bus.emit_lossy(CareEvent::BatchCompleted {
            operation: "validate".to_string(),
            total: report.total,
            failed: report.errors,
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    async fn validate_one(&self, id: &str, cancel: &CancellationToken) -> ValidationItem {
        let lookup = retry_with_backoff("validate call", &self.retry_policy, cancel, || {
            self.calls.fetch_call_metadata(id)
        })
        .await;

        let (status, message) = match lookup {
            Ok(_) => (ValidationStatus::Valid, None),
            Err(ProviderError::NotFound(_)) => (
                ValidationStatus::Invalid,
                Some("call no longer exists at provider".to_string()),
            ),
            Err(err) => (ValidationStatus::Error, Some(err.to_string())),
        };

        ValidationItem {
            conversation_id: id.to_string(),
            status,
            message,
        }
    }
}

/// Sleep between groups; `false` when cancelled first
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
