//! Conversation record persistence
//!
//! The lifecycle and batch code only see [`ConversationStore`]; the service
//! uses [`SqliteConversationStore`]. Last write wins per id.

use async_trait::async_trait;
use callguard_common::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{
    AnalysisSource, ConversationRecord, CounselingRecommendation, LifecycleStatus, RiskLevel,
};
use crate::utils::retry_on_lock;

/// Persistence contract for conversation records
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert or fully replace the record with the same id
    async fn upsert(&self, record: &ConversationRecord) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ConversationRecord>>;

    async fn find_by_correlation_ref(&self, telephony_call_ref: &str)
        -> Result<Option<ConversationRecord>>;

    /// Every record, most recently updated first
    async fn list_all(&self) -> Result<Vec<ConversationRecord>>;
}

/// SQLite-backed store on the shared pool
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, telephony_call_ref, originator, created_at, updated_at, transcript,
           recording_ref, risk_level, counseling_recommendation, risk_score,
           immediate_intervention, assessment_summary, emotional_state,
           concerning_phrases, support_recommendations, confidence, language,
           lifecycle_status, last_analysis_source
    FROM conversations
"#;

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn upsert(&self, record: &ConversationRecord) -> Result<()> {
        // Prepare all bound values before touching the pool
        let concerning_phrases = serde_json::to_string(&record.concerning_phrases).map_err(|e| {
            Error::Internal(format!("Failed to serialize concerning phrases: {}", e))
        })?;
        let created_at = format_timestamp(&record.created_at);
        let updated_at = format_timestamp(&record.updated_at);
        let last_source = record.last_analysis_source.map(|s| s.as_str());

        retry_on_lock("conversation upsert", || async {
            sqlx::query(
                r#"
                INSERT INTO conversations (
                    id, telephony_call_ref, originator, created_at, updated_at, transcript,
                    recording_ref, risk_level, counseling_recommendation, risk_score,
                    immediate_intervention, assessment_summary, emotional_state,
                    concerning_phrases, support_recommendations, confidence, language,
                    lifecycle_status, last_analysis_source
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    telephony_call_ref = excluded.telephony_call_ref,
                    originator = excluded.originator,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    transcript = excluded.transcript,
                    recording_ref = excluded.recording_ref,
                    risk_level = excluded.risk_level,
                    counseling_recommendation = excluded.counseling_recommendation,
                    risk_score = excluded.risk_score,
                    immediate_intervention = excluded.immediate_intervention,
                    assessment_summary = excluded.assessment_summary,
                    emotional_state = excluded.emotional_state,
                    concerning_phrases = excluded.concerning_phrases,
                    support_recommendations = excluded.support_recommendations,
                    confidence = excluded.confidence,
                    language = excluded.language,
                    lifecycle_status = excluded.lifecycle_status,
                    last_analysis_source = excluded.last_analysis_source
                "#,
            )
            .bind(&record.id)
            .bind(&record.telephony_call_ref)
            .bind(&record.originator)
            .bind(&created_at)
            .bind(&updated_at)
            .bind(&record.transcript)
            .bind(&record.recording_ref)
            .bind(record.risk_level.as_str())
            .bind(record.counseling_recommendation.as_str())
            .bind(record.risk_score)
            .bind(record.immediate_intervention)
            .bind(&record.assessment_summary)
            .bind(&record.emotional_state)
            .bind(&concerning_phrases)
            .bind(&record.support_recommendations)
            .bind(record.confidence)
            .bind(&record.language)
            .bind(record.lifecycle_status.as_str())
            .bind(last_source)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ConversationRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_correlation_ref(
        &self,
        telephony_call_ref: &str,
    ) -> Result<Option<ConversationRecord>> {
        let row = sqlx::query(&format!(
            "{} WHERE telephony_call_ref = ? ORDER BY updated_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(telephony_call_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<ConversationRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY updated_at DESC, id ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }
}

/// Fixed-width RFC 3339 so `ORDER BY updated_at` sorts chronologically
fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn record_from_row(row: &SqliteRow) -> Result<ConversationRecord> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let phrases: String = row.get("concerning_phrases");
    let concerning_phrases: Vec<String> = serde_json::from_str(&phrases).map_err(|e| {
        Error::Internal(format!("Failed to deserialize concerning phrases: {}", e))
    })?;

    let risk_level: String = row.get("risk_level");
    let counseling: String = row.get("counseling_recommendation");
    let status: String = row.get("lifecycle_status");
    let source: Option<String> = row.get("last_analysis_source");

    Ok(ConversationRecord {
        id: row.get("id"),
        telephony_call_ref: row.get("telephony_call_ref"),
        originator: row.get("originator"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
        transcript: row.get("transcript"),
        recording_ref: row.get("recording_ref"),
        risk_level: RiskLevel::parse_lenient(&risk_level),
        counseling_recommendation: CounselingRecommendation::parse_lenient(&counseling),
        risk_score: row.get("risk_score"),
        immediate_intervention: row.get("immediate_intervention"),
        assessment_summary: row.get("assessment_summary"),
        emotional_state: row.get("emotional_state"),
        concerning_phrases,
        support_recommendations: row.get("support_recommendations"),
        confidence: row.get("confidence"),
        language: row.get("language"),
        lifecycle_status: LifecycleStatus::parse(&status).ok_or_else(|| {
            Error::Internal(format!("Unknown lifecycle status in database: {}", status))
        })?,
        last_analysis_source: source.as_deref().and_then(AnalysisSource::parse),
    })
}
