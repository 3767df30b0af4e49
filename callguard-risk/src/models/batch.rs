//! Per-item outcomes and aggregate reports for bulk operations

use serde::{Deserialize, Serialize};

use super::conversation::RiskLevel;

/// Outcome of refreshing one conversation inside `batch_refresh`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    /// Transcript changed
    Updated,
    /// Refresh failed; see message
    Failed,
    /// Assessment ran but produced nothing new
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshItem {
    pub conversation_id: String,
    pub status: RefreshStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRefreshReport {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<RefreshItem>,
}

impl BatchRefreshReport {
    pub fn push(&mut self, item: RefreshItem) {
        self.total += 1;
        match item.status {
            RefreshStatus::Updated => self.updated += 1,
            RefreshStatus::Failed => self.failed += 1,
            RefreshStatus::Skipped => self.skipped += 1,
        }
        self.items.push(item);
    }
}

/// Outcome of importing one provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Created,
    Updated,
    /// Provider entry had no call identifier
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportItem {
    pub conversation_id: Option<String>,
    pub status: ImportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub requested_limit: usize,
    /// Calls returned by the provider listing
    pub listed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Stopped early; unprocessed calls have no item
    pub cancelled: bool,
    pub items: Vec<ImportItem>,
}

impl ImportReport {
    pub fn push(&mut self, item: ImportItem) {
        match item.status {
            ImportStatus::Created => self.created += 1,
            ImportStatus::Updated => self.updated += 1,
            ImportStatus::Skipped => self.skipped += 1,
            ImportStatus::Failed => self.failed += 1,
        }
        self.items.push(item);
    }
}

/// Existence check of one stored conversation against the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    /// Provider says the call does not exist: orphaned local record
    Invalid,
    /// Inconclusive (timeout, rate limit, transport...)
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationItem {
    pub conversation_id: String,
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: usize,
    pub cancelled: bool,
    pub items: Vec<ValidationItem>,
}

impl ValidationReport {
    pub fn push(&mut self, item: ValidationItem) {
        match item.status {
            ValidationStatus::Valid => self.valid += 1,
            ValidationStatus::Invalid => self.invalid += 1,
            ValidationStatus::Error => self.errors += 1,
        }
        self.items.push(item);
    }
}
