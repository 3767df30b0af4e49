//! Data models for callguard-risk
//!
//! - Conversation record and its risk vocabulary
//! - Assessment value object
//! - Bulk operation reports

pub mod assessment;
pub mod batch;
pub mod conversation;

pub use assessment::AssessmentResult;
pub use batch::{
    BatchRefreshReport, ImportItem, ImportReport, ImportStatus, RefreshItem, RefreshStatus,
    ValidationItem, ValidationReport, ValidationStatus,
};
pub use conversation::{
    AnalysisSource, ConversationRecord, CounselingRecommendation, LifecycleStatus, RiskLevel,
};
