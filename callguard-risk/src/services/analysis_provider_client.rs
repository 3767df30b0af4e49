//! AI analysis provider client
//!
//! Talks to a Gemini-style `generateContent` endpoint. Audio goes inline as
//! base64 with its MIME type; text goes as a plain text part. The model is
//! asked for JSON, but the reply is still run through
//! [`parse_analysis_text`] because models wrap JSON in fences or prose.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;

use super::provider::{redacted, AnalysisContent, AnalysisProvider, ProviderError};
use super::response_validator::parse_analysis_text;

pub const DEFAULT_ANALYSIS_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(15);
/// Audio analysis includes transcription and is much slower
pub const DEFAULT_AUDIO_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;
const USER_AGENT: &str = concat!("CallGuard/", env!("CARGO_PKG_VERSION"));
/// Key travels in a header so it never appears in a request URL
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Request body for one submission
pub fn build_request_body(content: &AnalysisContent, instructions: &str) -> Value {
    let content_part = match content {
        AnalysisContent::Audio(audio) => json!({
            "inline_data": {
                "mime_type": audio.mime_type,
                "data": BASE64.encode(&audio.bytes),
            }
        }),
        AnalysisContent::Text(text) => json!({ "text": text }),
    };

    json!({
        "contents": [{
            "parts": [content_part, { "text": instructions }]
        }],
        "generationConfig": {
            "temperature": 0.1,
            "responseMimeType": "application/json"
        }
    })
}

/// Concatenated text of the first candidate, parsed into a JSON object
pub fn extract_analysis(response_body: &Value) -> Result<Value, ProviderError> {
    let response: GenerateContentResponse = serde_json::from_value(response_body.clone())
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::InvalidResponse(
            "analysis provider returned no text".to_string(),
        ));
    }

    parse_analysis_text(&text)
}

/// Analysis provider HTTP client
pub struct AnalysisProviderClient {
    http_client: reqwest::Client,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
    base_url: String,
    model: String,
    api_key: Option<String>,
    text_timeout: Duration,
    audio_timeout: Duration,
}

impl AnalysisProviderClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let quota = governor::Quota::per_second(
            NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            http_client,
            rate_limiter: governor::RateLimiter::direct(quota),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            text_timeout: DEFAULT_TEXT_TIMEOUT,
            audio_timeout: DEFAULT_AUDIO_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, text: Duration, audio: Duration) -> Self {
        self.text_timeout = text;
        self.audio_timeout = audio;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl AnalysisProvider for AnalysisProviderClient {
    async fn submit_for_analysis(
        &self,
        content: &AnalysisContent,
        instructions: &str,
    ) -> Result<Value, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials("analysis provider"))?;

        let timeout = match content {
            AnalysisContent::Audio(_) => self.audio_timeout,
            AnalysisContent::Text(_) => self.text_timeout,
        };

        self.rate_limiter.until_ready().await;

        tracing::debug!(
            kind = content.kind(),
            model = %self.model,
            timeout_secs = timeout.as_secs(),
            "Submitting content for analysis"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&build_request_body(content, instructions))
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), "analysis model", body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(redacted(e)))?;

        extract_analysis(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::AudioBytes;

    #[test]
    fn test_audio_body_is_inline_base64() {
        let content = AnalysisContent::Audio(AudioBytes {
            bytes: vec![1, 2, 3],
            mime_type: "audio/wav".to_string(),
        });
        let body = build_request_body(&content, "assess");

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "audio/wav");
        assert_eq!(parts[0]["inline_data"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "assess");
    }

    #[test]
    fn test_text_body_is_text_part() {
        let body = build_request_body(&AnalysisContent::Text("Caller: hi".to_string()), "assess");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Caller: hi");
    }

    #[test]
    fn test_extract_fenced_candidate_text() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n{\"risk_level\":\"medium\"}\n```" }] }
            }]
        });
        assert_eq!(extract_analysis(&body).unwrap()["risk_level"], "medium");
    }

    #[test]
    fn test_extract_without_candidates_is_invalid() {
        assert!(matches!(
            extract_analysis(&json!({ "candidates": [] })),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let client = AnalysisProviderClient::new("http://127.0.0.1:9", "m", Some("  ".to_string())).unwrap();
        let err = client
            .submit_for_analysis(&AnalysisContent::Text("x".to_string()), "assess")
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingCredentials("analysis provider"));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        // Nothing listens on the discard port
        let client =
            AnalysisProviderClient::new("http://127.0.0.1:9", "m", Some("SECRETKEY123".to_string()))
                .unwrap()
                .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
        let err = client
            .submit_for_analysis(&AnalysisContent::Text("x".to_string()), "assess")
            .await
            .unwrap_err();

        assert!(err.is_transient(), "unexpected error: {:?}", err);
        let message = err.to_string();
        assert!(!message.contains("SECRETKEY123"), "key leaked: {}", message);
        assert!(!message.contains("generateContent"), "URL leaked: {}", message);
    }
}
