//! Provider client adapter
//!
//! Typed seam between the assessment pipeline and the two external
//! providers: the voice provider (call metadata, recordings, transcript
//! messages, call listing) and the AI analysis provider.
//!
//! Every failure surfaces as a [`ProviderError`]; HTTP status codes never
//! reach callers except as `Upstream { status }` for codes with no better
//! mapping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::retry::RetryClassify;

/// Provider call failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Provider request timed out")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider rate limit exceeded")]
    RateLimited,

    #[error("Recording locator expired")]
    LocatorExpired,

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Missing credentials for {0}")]
    MissingCredentials(&'static str),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Map a non-success status; `context` names what was requested
    pub fn from_status(status: u16, context: &str, body: String) -> Self {
        match status {
            404 => ProviderError::NotFound(context.to_string()),
            408 | 504 => ProviderError::Timeout,
            429 => ProviderError::RateLimited,
            _ => ProviderError::Upstream {
                status,
                message: truncate_message(body),
            },
        }
    }

    /// Retrying may change the outcome
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::RateLimited | ProviderError::Transport(_) => {
                true
            }
            ProviderError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// reqwest error text with the request URL removed
///
/// Signed recording URLs carry access tokens; they must not reach logs,
/// stored summaries or HTTP error bodies.
pub fn redacted(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::InvalidResponse(redacted(err))
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status.as_u16(), "request", redacted(err))
        } else {
            ProviderError::Transport(redacted(err))
        }
    }
}

impl RetryClassify for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }

    fn cancelled() -> Self {
        ProviderError::Cancelled
    }
}

fn truncate_message(body: String) -> String {
    const MAX_ERROR_BODY: usize = 200;
    if body.chars().count() <= MAX_ERROR_BODY {
        body
    } else {
        body.chars().take(MAX_ERROR_BODY).collect()
    }
}

/// Speaker of one transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    Caller,
    Assistant,
    Other,
}

impl SpeakerRole {
    pub fn label(&self) -> &'static str {
        match self {
            SpeakerRole::Caller => "Caller",
            SpeakerRole::Assistant => "Assistant",
            SpeakerRole::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: SpeakerRole,
    pub text: String,
}

/// Render messages as one `Role: text` line each, skipping blank messages
pub fn render_transcript(messages: &[TranscriptMessage]) -> String {
    messages
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| format!("{}: {}", m.role.label(), m.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Call details from the voice provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub id: String,
    /// Caller address
    pub originator: Option<String>,
    /// Telephony session id of the underlying phone call
    pub telephony_call_ref: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub has_recording: bool,
}

/// One entry of the provider's call listing
///
/// `id` is optional: listings occasionally contain entries without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub id: Option<String>,
    pub originator: Option<String>,
    pub telephony_call_ref: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Short-lived signed reference to call audio
///
/// Valid for minutes at most. Obtain one per assessment attempt and drop it
/// afterwards; never persist it as a way to fetch audio later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingLocator {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
}

/// Downloaded recording payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBytes {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// What to submit to the analysis provider, chosen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisContent {
    /// Transcribe and assess
    Audio(AudioBytes),
    /// Assess only
    Text(String),
}

impl AnalysisContent {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisContent::Audio(_) => "audio",
            AnalysisContent::Text(_) => "text",
        }
    }
}

/// Voice provider operations
#[async_trait]
pub trait CallProvider: Send + Sync {
    /// `NotFound` when the provider has no such call
    async fn fetch_call_metadata(&self, call_id: &str) -> Result<CallMetadata, ProviderError>;

    /// Always a network round-trip; `NotFound` when the call has no recording
    async fn fetch_fresh_recording_locator(
        &self,
        call_id: &str,
    ) -> Result<RecordingLocator, ProviderError>;

    /// Ordered transcript messages, system messages excluded
    async fn fetch_transcript_messages(
        &self,
        call_id: &str,
    ) -> Result<Vec<TranscriptMessage>, ProviderError>;

    /// `LocatorExpired` when the signed locator is no longer accepted
    async fn download_recording(
        &self,
        locator: &RecordingLocator,
    ) -> Result<AudioBytes, ProviderError>;

    /// Most recent calls, at most `limit`
    async fn list_calls(&self, limit: usize) -> Result<Vec<CallSummary>, ProviderError>;
}

/// AI analysis provider
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Raw JSON object produced by the provider, not yet validated
    async fn submit_for_analysis(
        &self,
        content: &AnalysisContent,
        instructions: &str,
    ) -> Result<serde_json::Value, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProviderError::from_status(404, "call c1", String::new()),
            ProviderError::NotFound("call c1".to_string())
        );
        assert_eq!(
            ProviderError::from_status(429, "call c1", String::new()),
            ProviderError::RateLimited
        );
        assert_eq!(
            ProviderError::from_status(504, "call c1", String::new()),
            ProviderError::Timeout
        );
        assert!(matches!(
            ProviderError::from_status(502, "call c1", "bad gateway".to_string()),
            ProviderError::Upstream { status: 502, .. }
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Transport("reset".to_string()).is_transient());
        assert!(ProviderError::Upstream { status: 503, message: String::new() }.is_transient());

        assert!(!ProviderError::NotFound("x".to_string()).is_transient());
        assert!(!ProviderError::InvalidResponse("x".to_string()).is_transient());
        assert!(!ProviderError::LocatorExpired.is_transient());
        assert!(!ProviderError::MissingCredentials("voice provider").is_transient());
        assert!(!ProviderError::Upstream { status: 400, message: String::new() }.is_transient());
    }

    #[test]
    fn test_upstream_message_truncated() {
        let err = ProviderError::from_status(500, "x", "e".repeat(1000));
        match err {
            ProviderError::Upstream { message, .. } => assert_eq!(message.len(), 200),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_render_transcript() {
        let messages = vec![
            TranscriptMessage {
                role: SpeakerRole::Assistant,
                text: "How are you feeling today?".to_string(),
            },
            TranscriptMessage {
                role: SpeakerRole::Caller,
                text: "  Not great.  ".to_string(),
            },
            TranscriptMessage {
                role: SpeakerRole::Caller,
                text: "   ".to_string(),
            },
        ];

        assert_eq!(
            render_transcript(&messages),
            "Assistant: How are you feeling today?\nCaller: Not great."
        );
        assert_eq!(render_transcript(&[]), "");
    }
}
