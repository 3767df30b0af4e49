//! In-process stand-ins for the voice provider, analysis provider and alerter

use async_trait::async_trait;
use callguard_risk::models::RiskLevel;
use callguard_risk::services::risk_engine::NO_CONTENT_PLACEHOLDER;
use callguard_risk::services::{
    AlertError, Alerter, AnalysisContent, AnalysisProvider, AudioBytes, CallMetadata,
    CallProvider, CallSummary, ProviderError, RecordingLocator, SpeakerRole, TranscriptMessage,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the fake serves a call's recording
#[derive(Debug, Clone)]
pub enum RecordingBehavior {
    /// Locator and download both succeed
    Available(Vec<u8>),
    /// Locator is issued but the download is refused
    Expired,
    /// Locator request fails
    Failing(ProviderError),
}

#[derive(Debug, Clone, Default)]
struct FakeCall {
    originator: Option<String>,
    telephony_call_ref: Option<String>,
    recording: Option<RecordingBehavior>,
    messages: Vec<TranscriptMessage>,
    metadata_error: Option<ProviderError>,
}

/// Scriptable voice provider
#[derive(Default)]
pub struct FakeCallProvider {
    calls: Mutex<HashMap<String, FakeCall>>,
    listing: Mutex<Vec<CallSummary>>,
    pub metadata_fetches: AtomicUsize,
    pub locator_fetches: AtomicUsize,
    pub downloads: AtomicUsize,
    pub message_fetches: AtomicUsize,
}

impl FakeCallProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, call_id: &str, apply: impl FnOnce(&mut FakeCall)) {
        let mut calls = self.calls.lock().unwrap();
        apply(calls.entry(call_id.to_string()).or_default());
    }

    /// Known call with no recording and no messages
    pub fn with_call(self, call_id: &str) -> Self {
        self.update(call_id, |_| {});
        self
    }

    pub fn with_recording(self, call_id: &str, bytes: &[u8]) -> Self {
        let bytes = bytes.to_vec();
        self.update(call_id, |call| call.recording = Some(RecordingBehavior::Available(bytes)));
        self
    }

    pub fn with_expired_recording(self, call_id: &str) -> Self {
        self.update(call_id, |call| call.recording = Some(RecordingBehavior::Expired));
        self
    }

    pub fn with_failing_recording(self, call_id: &str, error: ProviderError) -> Self {
        self.update(call_id, |call| call.recording = Some(RecordingBehavior::Failing(error)));
        self
    }

    /// Transcript messages as (is_caller, text) pairs
    pub fn with_messages(self, call_id: &str, lines: &[(bool, &str)]) -> Self {
        let messages = lines
            .iter()
            .map(|(is_caller, text)| TranscriptMessage {
                role: if *is_caller {
                    SpeakerRole::Caller
                } else {
                    SpeakerRole::Assistant
                },
                text: text.to_string(),
            })
            .collect();
        self.update(call_id, |call| call.messages = messages);
        self
    }

    pub fn with_metadata_error(self, call_id: &str, error: ProviderError) -> Self {
        self.update(call_id, |call| call.metadata_error = Some(error));
        self
    }

    /// Listed calls; ids are registered as known calls
    pub fn with_listing(self, listing: Vec<CallSummary>) -> Self {
        for entry in &listing {
            if let Some(id) = &entry.id {
                let originator = entry.originator.clone();
                let telephony_call_ref = entry.telephony_call_ref.clone();
                self.update(id, |call| {
                    call.originator = originator;
                    call.telephony_call_ref = telephony_call_ref;
                });
            }
        }
        *self.listing.lock().unwrap() = listing;
        self
    }

    fn call(&self, call_id: &str) -> Result<FakeCall, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .get(call_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("call {}", call_id)))
    }
}

/// Listing entry for `call_id`
pub fn summary(call_id: &str) -> CallSummary {
    CallSummary {
        id: Some(call_id.to_string()),
        originator: Some("+15550100".to_string()),
        telephony_call_ref: Some(format!("tel-{}", call_id)),
        created_at: Some(Utc::now()),
    }
}

#[async_trait]
impl CallProvider for FakeCallProvider {
    async fn fetch_call_metadata(&self, call_id: &str) -> Result<CallMetadata, ProviderError> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        let call = self.call(call_id)?;
        if let Some(error) = call.metadata_error {
            return Err(error);
        }
        Ok(CallMetadata {
            id: call_id.to_string(),
            originator: call.originator,
            telephony_call_ref: call.telephony_call_ref,
            status: Some("ended".to_string()),
            created_at: Some(Utc::now()),
            has_recording: call.recording.is_some(),
        })
    }

    async fn fetch_fresh_recording_locator(
        &self,
        call_id: &str,
    ) -> Result<RecordingLocator, ProviderError> {
        self.locator_fetches.fetch_add(1, Ordering::SeqCst);
        match self.call(call_id)?.recording {
            Some(RecordingBehavior::Failing(error)) => Err(error),
            Some(_) => Ok(RecordingLocator {
                url: format!("https://recordings.test/{}.wav", call_id),
                fetched_at: Utc::now(),
            }),
            None => Err(ProviderError::NotFound(format!("recording for call {}", call_id))),
        }
    }

    async fn fetch_transcript_messages(
        &self,
        call_id: &str,
    ) -> Result<Vec<TranscriptMessage>, ProviderError> {
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.call(call_id)?.messages)
    }

    async fn download_recording(
        &self,
        locator: &RecordingLocator,
    ) -> Result<AudioBytes, ProviderError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let call_id = locator
            .url
            .trim_start_matches("https://recordings.test/")
            .trim_end_matches(".wav");
        match self.call(call_id)?.recording {
            Some(RecordingBehavior::Available(bytes)) => Ok(AudioBytes {
                bytes,
                mime_type: "audio/wav".to_string(),
            }),
            Some(RecordingBehavior::Expired) => Err(ProviderError::LocatorExpired),
            Some(RecordingBehavior::Failing(error)) => Err(error),
            None => Err(ProviderError::NotFound(locator.url.clone())),
        }
    }

    async fn list_calls(&self, limit: usize) -> Result<Vec<CallSummary>, ProviderError> {
        let listing = self.listing.lock().unwrap();
        Ok(listing.iter().take(limit).cloned().collect())
    }
}

/// What the analysis provider was asked to assess
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Audio,
    Text(String),
    Placeholder,
}

/// Scriptable analysis provider
///
/// Each content kind answers with its configured JSON, or a non-transient
/// upstream error when none is configured.
#[derive(Default)]
pub struct FakeAnalysisProvider {
    audio_response: Option<Value>,
    text_response: Option<Value>,
    placeholder_response: Option<Value>,
    submissions: Mutex<Vec<Submission>>,
}

impl FakeAnalysisProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio_response(mut self, response: Value) -> Self {
        self.audio_response = Some(response);
        self
    }

    pub fn with_text_response(mut self, response: Value) -> Self {
        self.text_response = Some(response);
        self
    }

    pub fn with_placeholder_response(mut self, response: Value) -> Self {
        self.placeholder_response = Some(response);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisProvider for FakeAnalysisProvider {
    async fn submit_for_analysis(
        &self,
        content: &AnalysisContent,
        _instructions: &str,
    ) -> Result<Value, ProviderError> {
        let (submission, response) = match content {
            AnalysisContent::Audio(_) => (Submission::Audio, &self.audio_response),
            AnalysisContent::Text(text) if text == NO_CONTENT_PLACEHOLDER => {
                (Submission::Placeholder, &self.placeholder_response)
            }
            AnalysisContent::Text(text) => (Submission::Text(text.clone()), &self.text_response),
        };
        self.submissions.lock().unwrap().push(submission);

        response.clone().ok_or_else(|| ProviderError::Upstream {
            status: 400,
            message: "no scripted response".to_string(),
        })
    }
}

/// Provider payload for a given level
pub fn analysis_json(risk_level: &str, immediate_intervention: bool) -> Value {
    json!({
        "risk_level": risk_level,
        "counseling_needed": if immediate_intervention { "required" } else { "advised" },
        "immediate_intervention": immediate_intervention,
        "emotional_state": "distressed",
        "concerning_phrases": ["I can't keep going"],
        "assessment_summary": format!("Caller presents {} risk.", risk_level),
        "confidence_level": 0.85,
        "language_used": "en",
        "support_recommendations": "Follow up within 24 hours"
    })
}

/// Audio payload including the transcription
pub fn audio_analysis_json(risk_level: &str, immediate_intervention: bool, transcript: &str) -> Value {
    let mut value = analysis_json(risk_level, immediate_intervention);
    value["transcript"] = Value::String(transcript.to_string());
    value
}

/// Alerter that records every notification
#[derive(Default)]
pub struct RecordingAlerter {
    alerts: Mutex<Vec<(String, RiskLevel)>>,
    fail: bool,
}

impl RecordingAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the attempt, then reports a delivery failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn alerts(&self) -> Vec<(String, RiskLevel)> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl Alerter for RecordingAlerter {
    async fn notify(&self, conversation_id: &str, risk_level: RiskLevel) -> Result<(), AlertError> {
        self.alerts
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), risk_level));
        if self.fail {
            return Err(AlertError::Delivery("pager offline".to_string()));
        }
        Ok(())
    }
}
