//! Voice provider REST client
//!
//! Bearer-token client for the hosted voice-agent platform that places and
//! records calls. Every request is paced by a shared rate limiter and carries
//! its own timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

use super::provider::{
    redacted, AudioBytes, CallMetadata, CallProvider, CallSummary, ProviderError, RecordingLocator,
    SpeakerRole, TranscriptMessage,
};

pub const DEFAULT_VOICE_API_BASE_URL: &str = "https://api.vapi.ai";
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;
const USER_AGENT: &str = concat!("CallGuard/", env!("CARGO_PKG_VERSION"));
const DEFAULT_AUDIO_MIME: &str = "audio/wav";
/// Inline audio submissions are capped by the analysis provider
pub const MAX_RECORDING_BYTES: usize = 20 * 1024 * 1024;

type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Call object as returned by `GET /call/{id}` and `GET /call`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCallPayload {
    pub id: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub phone_call_provider_id: Option<String>,
    pub customer: Option<VoiceCustomer>,
    pub recording_url: Option<String>,
    pub artifact: Option<VoiceArtifact>,
    #[serde(default)]
    pub messages: Vec<VoiceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceCustomer {
    pub number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceArtifact {
    pub recording_url: Option<String>,
    #[serde(default)]
    pub messages: Vec<VoiceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceMessage {
    pub role: Option<String>,
    pub message: Option<String>,
}

impl VoiceCallPayload {
    /// Top-level field first, then the artifact
    pub fn recording_url(&self) -> Option<&str> {
        self.recording_url
            .as_deref()
            .or_else(|| self.artifact.as_ref()?.recording_url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    fn originator(&self) -> Option<String> {
        self.customer.as_ref()?.number.clone()
    }

    /// Ordered transcript messages with system prompts removed
    pub fn transcript_messages(&self) -> Vec<TranscriptMessage> {
        let source = if self.messages.is_empty() {
            self.artifact
                .as_ref()
                .map(|a| a.messages.as_slice())
                .unwrap_or_default()
        } else {
            self.messages.as_slice()
        };

        source
            .iter()
            .filter_map(|m| {
                let role = map_role(m.role.as_deref()?)?;
                let text = m.message.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                Some(TranscriptMessage {
                    role,
                    text: text.to_string(),
                })
            })
            .collect()
    }

    pub fn into_metadata(self, requested_id: &str) -> CallMetadata {
        let has_recording = self.recording_url().is_some();
        CallMetadata {
            id: self.id.clone().unwrap_or_else(|| requested_id.to_string()),
            originator: self.originator(),
            telephony_call_ref: self.phone_call_provider_id.clone(),
            status: self.status.clone(),
            created_at: self.created_at,
            has_recording,
        }
    }

    pub fn into_summary(self) -> CallSummary {
        CallSummary {
            originator: self.originator(),
            id: self.id.filter(|id| !id.trim().is_empty()),
            telephony_call_ref: self.phone_call_provider_id,
            created_at: self.created_at,
        }
    }
}

/// `None` for system/tool messages, which are not part of the conversation
fn map_role(role: &str) -> Option<SpeakerRole> {
    match role.to_ascii_lowercase().as_str() {
        "system" | "tool" | "tool_calls" | "tool_call_result" => None,
        "user" | "customer" => Some(SpeakerRole::Caller),
        "assistant" | "bot" => Some(SpeakerRole::Assistant),
        _ => Some(SpeakerRole::Other),
    }
}

/// Voice provider HTTP client
pub struct VoiceProviderClient {
    http_client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
    base_url: String,
    api_key: Option<String>,
    metadata_timeout: Duration,
    download_timeout: Duration,
}

impl VoiceProviderClient {
    /// `api_key = None` builds a client whose every call fails with
    /// `MissingCredentials`
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: governor::RateLimiter::direct(quota(DEFAULT_REQUESTS_PER_SECOND)),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, metadata: Duration, download: Duration) -> Self {
        self.metadata_timeout = metadata;
        self.download_timeout = download;
        self
    }

    pub fn with_requests_per_second(mut self, requests_per_second: u32) -> Self {
        self.rate_limiter = governor::RateLimiter::direct(quota(requests_per_second));
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials("voice provider"))
    }

    /// `base_url` extended by percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ProviderError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Transport(format!("invalid voice API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Transport("voice API base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: reqwest::Url,
        context: &str,
    ) -> Result<T, ProviderError> {
        let api_key = self.api_key()?;
        self.rate_limiter.until_ready().await;

        tracing::debug!(url = %url, "Voice provider request");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(api_key)
            .timeout(self.metadata_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), context, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(redacted(e)))
    }

    async fn fetch_call(&self, call_id: &str) -> Result<VoiceCallPayload, ProviderError> {
        let url = self.endpoint(&["call", call_id])?;
        self.get_json(url, &format!("call {}", call_id)).await
    }
}

fn quota(requests_per_second: u32) -> governor::Quota {
    governor::Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN))
}

#[async_trait]
impl CallProvider for VoiceProviderClient {
    async fn fetch_call_metadata(&self, call_id: &str) -> Result<CallMetadata, ProviderError> {
        Ok(self.fetch_call(call_id).await?.into_metadata(call_id))
    }

    async fn fetch_fresh_recording_locator(
        &self,
        call_id: &str,
    ) -> Result<RecordingLocator, ProviderError> {
        let payload = self.fetch_call(call_id).await?;
        let url = payload
            .recording_url()
            .ok_or_else(|| ProviderError::NotFound(format!("recording for call {}", call_id)))?;

        Ok(RecordingLocator {
            url: url.to_string(),
            fetched_at: Utc::now(),
        })
    }

    async fn fetch_transcript_messages(
        &self,
        call_id: &str,
    ) -> Result<Vec<TranscriptMessage>, ProviderError> {
        Ok(self.fetch_call(call_id).await?.transcript_messages())
    }

    async fn download_recording(
        &self,
        locator: &RecordingLocator,
    ) -> Result<AudioBytes, ProviderError> {
        self.rate_limiter.until_ready().await;

        // Signed URL: no bearer token
        let mut response = self
            .http_client
            .get(&locator.url)
            .timeout(self.download_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            403 | 410 => return Err(ProviderError::LocatorExpired),
            s if !(200..300).contains(&s) => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(s, "recording", body));
            }
            _ => {}
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or_else(|| mime_from_url(&locator.url).to_string());

        if let Some(declared) = response.content_length() {
            ensure_recording_size(declared as usize)?;
        }

        // Content-Length may be absent or wrong: enforce the cap while reading
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            ensure_recording_size(bytes.len() + chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "recording download was empty".to_string(),
            ));
        }

        tracing::debug!(bytes = bytes.len(), mime_type = %mime_type, "Recording downloaded");

        Ok(AudioBytes { bytes, mime_type })
    }

    async fn list_calls(&self, limit: usize) -> Result<Vec<CallSummary>, ProviderError> {
        let mut url = self.endpoint(&["call"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let calls: Vec<VoiceCallPayload> = self.get_json(url, "call listing").await?;

        Ok(calls
            .into_iter()
            .take(limit)
            .map(VoiceCallPayload::into_summary)
            .collect())
    }
}

fn ensure_recording_size(len: usize) -> Result<(), ProviderError> {
    if len > MAX_RECORDING_BYTES {
        return Err(ProviderError::InvalidResponse(format!(
            "recording exceeds {} bytes",
            MAX_RECORDING_BYTES
        )));
    }
    Ok(())
}

/// Guess the audio MIME type from the locator's path extension
fn mime_from_url(url: &str) -> &'static str {
    let path = url.split('?').next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".mp3") {
        "audio/mpeg"
    } else if path.ends_with(".ogg") {
        "audio/ogg"
    } else if path.ends_with(".m4a") {
        "audio/mp4"
    } else if path.ends_with(".flac") {
        "audio/flac"
    } else {
        DEFAULT_AUDIO_MIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: serde_json::Value) -> VoiceCallPayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_metadata_from_payload() {
        let call = payload(serde_json::json!({
            "id": "c1",
            "status": "ended",
            "createdAt": "2026-03-01T10:00:00Z",
            "phoneCallProviderId": "CA123",
            "customer": { "number": "+15550100" },
            "artifact": { "recordingUrl": "https://storage.example/rec/c1.wav?sig=abc" }
        }));

        let metadata = call.into_metadata("c1");
        assert_eq!(metadata.id, "c1");
        assert_eq!(metadata.originator.as_deref(), Some("+15550100"));
        assert_eq!(metadata.telephony_call_ref.as_deref(), Some("CA123"));
        assert!(metadata.has_recording);
    }

    #[test]
    fn test_blank_recording_url_is_absent() {
        let call = payload(serde_json::json!({ "id": "c1", "recordingUrl": "  " }));
        assert!(call.recording_url().is_none());
    }

    #[test]
    fn test_transcript_messages_drop_system_and_blank() {
        let call = payload(serde_json::json!({
            "id": "c1",
            "messages": [
                { "role": "system", "message": "You are a support agent" },
                { "role": "bot", "message": "Hello, how can I help?" },
                { "role": "user", "message": "I can't sleep" },
                { "role": "user", "message": "" },
                { "role": "tool_calls" }
            ]
        }));

        let messages = call.transcript_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, SpeakerRole::Assistant);
        assert_eq!(messages[1].role, SpeakerRole::Caller);
        assert_eq!(messages[1].text, "I can't sleep");
    }

    #[test]
    fn test_summary_without_id() {
        let call = payload(serde_json::json!({ "status": "queued" }));
        assert!(call.into_summary().id.is_none());
    }

    #[test]
    fn test_mime_from_url() {
        assert_eq!(mime_from_url("https://x/rec.mp3?sig=1"), "audio/mpeg");
        assert_eq!(mime_from_url("https://x/rec"), "audio/wav");
    }

    #[test]
    fn test_call_id_is_percent_encoded_in_path() {
        let client = VoiceProviderClient::new("https://api.voice.test/v1/", Some("k".to_string())).unwrap();
        let url = client.endpoint(&["call", "a/b?c#d"]).unwrap();
        assert_eq!(url.as_str(), "https://api.voice.test/v1/call/a%2Fb%3Fc%23d");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_recording_size_cap() {
        assert!(ensure_recording_size(MAX_RECORDING_BYTES).is_ok());
        assert!(matches!(
            ensure_recording_size(MAX_RECORDING_BYTES + 1),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_download_error_does_not_expose_signed_url() {
        let client = VoiceProviderClient::new("http://127.0.0.1:9", Some("k".to_string()))
            .unwrap()
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
        let locator = RecordingLocator {
            url: "http://127.0.0.1:9/rec/c1.wav?signature=SIGNEDTOKEN".to_string(),
            fetched_at: Utc::now(),
        };

        let err = client.download_recording(&locator).await.unwrap_err();
        assert!(!err.to_string().contains("SIGNEDTOKEN"), "signed URL leaked: {}", err);
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let client = VoiceProviderClient::new("http://127.0.0.1:9", None).unwrap();
        let err = client.fetch_call_metadata("c1").await.unwrap_err();
        assert_eq!(err, ProviderError::MissingCredentials("voice provider"));
    }
}
