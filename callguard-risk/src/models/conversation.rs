//! Conversation record and its risk vocabulary
//!
//! A conversation is created on first contact (inbound call or import) and
//! mutated by every refresh, regenerate and batch operation. It is never
//! deleted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::assessment::AssessmentResult;

/// Ordinal risk level produced by the analysis provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Severe,
    #[default]
    Unknown,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 6] = [
        RiskLevel::None,
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Severe,
        RiskLevel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Severe => "severe",
            RiskLevel::Unknown => "unknown",
        }
    }

    /// Lenient parse: anything unrecognized becomes `Unknown`
    ///
    /// Accepts a few synonyms providers are known to emit ("critical",
    /// "moderate", "minimal").
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "no risk" | "minimal" => RiskLevel::None,
            "low" => RiskLevel::Low,
            "medium" | "moderate" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            "severe" | "critical" => RiskLevel::Severe,
            _ => RiskLevel::Unknown,
        }
    }

    /// Fixed display/sort score
    ///
    /// Pure lookup; the score never feeds back into classification.
    pub fn score(&self) -> i64 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::Low => 2,
            RiskLevel::Medium => 4,
            RiskLevel::High => 7,
            RiskLevel::Severe => 10,
            RiskLevel::Unknown => 0,
        }
    }

    pub fn is_crisis(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Severe)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the caller should be referred to counseling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounselingRecommendation {
    #[default]
    None,
    Advised,
    Required,
}

impl CounselingRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounselingRecommendation::None => "none",
            CounselingRecommendation::Advised => "advised",
            CounselingRecommendation::Required => "required",
        }
    }

    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "advised" | "recommended" | "yes" | "true" => CounselingRecommendation::Advised,
            "required" | "urgent" | "mandatory" => CounselingRecommendation::Required,
            _ => CounselingRecommendation::None,
        }
    }
}

/// Conversation lifecycle state
///
/// No state is terminal: every state accepts refresh and regenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Completed,
    NoTranscript,
    AnalysisOnly,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Completed => "completed",
            LifecycleStatus::NoTranscript => "no_transcript",
            LifecycleStatus::AnalysisOnly => "analysis_only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(LifecycleStatus::Active),
            "completed" => Some(LifecycleStatus::Completed),
            "no_transcript" => Some(LifecycleStatus::NoTranscript),
            "analysis_only" => Some(LifecycleStatus::AnalysisOnly),
            _ => None,
        }
    }

    /// Status after an assessment has been folded into a record
    ///
    /// `has_transcript` refers to the merged record, `audio_analyzed` to the
    /// source of the assessment that was just applied.
    pub fn after_assessment(has_transcript: bool, audio_analyzed: bool) -> Self {
        if has_transcript {
            LifecycleStatus::Completed
        } else if audio_analyzed {
            LifecycleStatus::AnalysisOnly
        } else {
            LifecycleStatus::NoTranscript
        }
    }
}

/// Provenance of an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisSource {
    Audio,
    Text,
    Cached,
    FallbackDefault,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::Audio => "audio",
            AnalysisSource::Text => "text",
            AnalysisSource::Cached => "cached",
            AnalysisSource::FallbackDefault => "fallback-default",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(AnalysisSource::Audio),
            "text" => Some(AnalysisSource::Text),
            "cached" => Some(AnalysisSource::Cached),
            "fallback-default" => Some(AnalysisSource::FallbackDefault),
            _ => None,
        }
    }
}

/// Persisted risk state of one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Opaque call identifier (unique)
    pub id: String,
    /// Inbound telephony session reference, resolves webhook events to `id`
    pub telephony_call_ref: Option<String>,
    /// Caller address
    pub originator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transcript: String,
    /// Last recording reference seen; informational only, never fetched
    pub recording_ref: Option<String>,
    pub risk_level: RiskLevel,
    pub counseling_recommendation: CounselingRecommendation,
    pub risk_score: i64,
    pub immediate_intervention: bool,
    pub assessment_summary: String,
    pub emotional_state: String,
    pub concerning_phrases: Vec<String>,
    pub support_recommendations: String,
    pub confidence: f64,
    pub language: Option<String>,
    pub lifecycle_status: LifecycleStatus,
    pub last_analysis_source: Option<AnalysisSource>,
}

impl ConversationRecord {
    /// New record in `active` state with no assessment yet
    pub fn new(id: &str, originator: &str, telephony_call_ref: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            telephony_call_ref,
            originator: originator.to_string(),
            created_at: now,
            updated_at: now,
            transcript: String::new(),
            recording_ref: None,
            risk_level: RiskLevel::Unknown,
            counseling_recommendation: CounselingRecommendation::None,
            risk_score: RiskLevel::Unknown.score(),
            immediate_intervention: false,
            assessment_summary: String::new(),
            emotional_state: String::new(),
            concerning_phrases: Vec::new(),
            support_recommendations: String::new(),
            confidence: 0.0,
            language: None,
            lifecycle_status: LifecycleStatus::Active,
            last_analysis_source: None,
        }
    }

    pub fn has_transcript(&self) -> bool {
        !self.transcript.trim().is_empty()
    }

    /// Fold an assessment into the record
    ///
    /// Merge rules:
    /// - an empty result transcript never erases a stored one
    /// - a `fallback-default` result never overwrites the risk fields of a
    ///   record that already holds a provider assessment
    ///
    /// Returns `true` when the transcript text changed.
    pub fn apply_assessment(&mut self, result: &AssessmentResult) -> bool {
        let previous_transcript = self.transcript.clone();

        if !result.transcript.trim().is_empty() {
            self.transcript = result.transcript.clone();
        }

        let keep_prior_assessment = result.source == AnalysisSource::FallbackDefault
            && self.risk_level != RiskLevel::Unknown;

        if !keep_prior_assessment {
            self.risk_level = result.risk_level;
            self.risk_score = result.risk_level.score();
            self.counseling_recommendation = result.counseling;
            self.immediate_intervention = result.immediate_intervention;
            self.assessment_summary = result.summary.clone();
            self.emotional_state = result.emotional_state.clone();
            self.concerning_phrases = result.concerning_phrases.clone();
            self.support_recommendations = result.recommendations.clone();
            self.confidence = result.confidence;
            if result.language.is_some() {
                self.language = result.language.clone();
            }
        }

        let audio_analyzed = result.source == AnalysisSource::Audio
            || (result.source == AnalysisSource::Cached
                && self.lifecycle_status == LifecycleStatus::AnalysisOnly);
        self.lifecycle_status =
            LifecycleStatus::after_assessment(self.has_transcript(), audio_analyzed);
        self.last_analysis_source = Some(result.source);
        self.updated_at = Utc::now();

        self.transcript != previous_transcript
    }
}
