//! Assessment value object returned by the risk engine

use serde::{Deserialize, Serialize};

use super::conversation::{AnalysisSource, CounselingRecommendation, RiskLevel};

/// Summary used when no provider produced an assessment
pub const DEGRADED_SUMMARY_PREFIX: &str = "Automated assessment unavailable";

/// Structured result of submitting audio or text to the analysis provider
///
/// Ephemeral: folded into a `ConversationRecord` on success, never persisted
/// on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    /// Transcript text; empty when none was produced or supplied
    pub transcript: String,
    pub risk_level: RiskLevel,
    pub counseling: CounselingRecommendation,
    pub immediate_intervention: bool,
    pub emotional_state: String,
    /// Short concerning excerpts, bounded in count and length
    pub concerning_phrases: Vec<String>,
    pub summary: String,
    /// Provider confidence in [0.0, 1.0]
    pub confidence: f64,
    pub language: Option<String>,
    pub recommendations: String,
    pub source: AnalysisSource,
    pub processing_time_ms: u64,
}

impl AssessmentResult {
    /// Degraded default (`risk_level = unknown`)
    pub fn fallback_default(reason: &str) -> Self {
        Self {
            transcript: String::new(),
            risk_level: RiskLevel::Unknown,
            counseling: CounselingRecommendation::None,
            immediate_intervention: false,
            emotional_state: String::new(),
            concerning_phrases: Vec::new(),
            summary: format!("{}: {}", DEGRADED_SUMMARY_PREFIX, reason),
            confidence: 0.0,
            language: None,
            recommendations: String::new(),
            source: AnalysisSource::FallbackDefault,
            processing_time_ms: 0,
        }
    }

    pub fn risk_score(&self) -> i64 {
        self.risk_level.score()
    }

    /// Same result re-labelled as served from cache
    pub fn as_cached(&self) -> Self {
        Self {
            source: AnalysisSource::Cached,
            processing_time_ms: 0,
            ..self.clone()
        }
    }
}
