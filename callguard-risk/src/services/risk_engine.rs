//! Risk assessment engine
//!
//! Produces one `AssessmentResult` per request by walking an ordered list of
//! strategies until one succeeds:
//!
//! 1. **Audio**: fresh recording locator, download, submit audio
//! 2. **Text**: stored transcript or provider transcript messages, submit text
//! 3. **Default**: when no transcript could be obtained, a placeholder
//!    submission (degraded `unknown` result if even that fails); when a
//!    transcript exists but text analysis failed, the degraded result directly
//!
//! A cache hit on the call id short-circuits the walk. Each provider call is
//! individually wrapped by the retry controller; the engine itself never
//! loops on a failure. Only cancellation escapes as an error.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::analysis_cache::{text_fingerprint, AnalysisCache};
use super::provider::{
    render_transcript, AnalysisContent, AnalysisProvider, CallProvider, ProviderError,
};
use super::response_validator::{truncate_chars, validate_analysis, MAX_TRANSCRIPT_CHARS};
use crate::models::{AnalysisSource, AssessmentResult};
use crate::utils::retry::{retry_with_backoff, RetryPolicy};

const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "risk_level": "none | low | medium | high | severe",
  "counseling_needed": "none | advised | required",
  "immediate_intervention": true | false,
  "emotional_state": "short description",
  "concerning_phrases": ["verbatim excerpts, at most 10"],
  "assessment_summary": "2-4 sentences",
  "confidence_level": 0.0-1.0,
  "language_used": "ISO 639-1 code",
  "support_recommendations": "concrete next steps for the care team"
}"#;

/// Instructions sent with a call recording
pub fn audio_instructions() -> String {
    format!(
        "You are assisting a mental-health support line. Listen to this call recording, \
         transcribe it verbatim with speaker labels (Caller/Assistant), and assess the \
         caller's risk of self-harm or crisis.\n\
         Add a \"transcript\" field containing the full transcription.\n{}",
        RESPONSE_FORMAT
    )
}

/// Instructions sent with a transcript
pub fn text_instructions() -> String {
    format!(
        "You are assisting a mental-health support line. Read this call transcript and \
         assess the caller's risk of self-harm or crisis. Base the assessment only on \
         what the caller said.\n{}",
        RESPONSE_FORMAT
    )
}

/// Submitted when no recording and no transcript could be obtained
pub const NO_CONTENT_PLACEHOLDER: &str =
    "No recording or transcript is available for this call. The call content is unknown.";

/// One step of the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Audio,
    Text,
    Default,
}

impl Strategy {
    /// Evaluation order
    pub const CHAIN: [Strategy; 3] = [Strategy::Audio, Strategy::Text, Strategy::Default];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Audio => "audio",
            Strategy::Text => "text",
            Strategy::Default => "default",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct RiskAssessmentEngine {
    calls: Arc<dyn CallProvider>,
    analysis: Arc<dyn AnalysisProvider>,
    cache: Arc<AnalysisCache>,
    retry_policy: RetryPolicy,
}

impl RiskAssessmentEngine {
    pub fn new(
        calls: Arc<dyn CallProvider>,
        analysis: Arc<dyn AnalysisProvider>,
        cache: Arc<AnalysisCache>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            calls,
            analysis,
            cache,
            retry_policy,
        }
    }

    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    /// Drop every cached result for a call so the next `assess` goes to
    /// the provider
    pub fn forget(&self, conversation_id: &str, known_transcript: Option<&str>) {
        self.cache.invalidate(conversation_id);
        if let Some(transcript) = known_transcript.filter(|t| !t.trim().is_empty()) {
            let truncated = truncate_chars(transcript, MAX_TRANSCRIPT_CHARS);
            self.cache.invalidate(&text_fingerprint(&truncated));
        }
    }

    /// Assess one call
    ///
    /// `known_transcript` is the transcript already stored for the call, if
    /// any. Never fails for provider reasons: the default strategy always
    /// yields a result. Returns `Err(Cancelled)` only when `cancel` fires.
    pub async fn assess(
        &self,
        conversation_id: &str,
        known_transcript: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AssessmentResult, ProviderError> {
        let started = Instant::now();

        if let Some(hit) = self.cache.get(conversation_id) {
            tracing::debug!(conversation_id, "Assessment served from cache");
            return Ok(hit.as_cached());
        }

        let known_transcript = known_transcript.filter(|t| !t.trim().is_empty());
        let mut failures: Vec<String> = Vec::new();
        // Set once the text strategy holds a transcript, analysed or not
        let mut obtained_transcript: Option<String> = None;

        for strategy in Strategy::CHAIN {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            let outcome = match strategy {
                Strategy::Audio => self.assess_audio(conversation_id, cancel).await,
                Strategy::Text => {
                    match self.obtain_transcript(conversation_id, known_transcript, cancel).await {
                        Ok(transcript) => {
                            obtained_transcript = Some(transcript.clone());
                            self.assess_text(conversation_id, transcript, cancel).await
                        }
                        Err(err) => Err(err),
                    }
                }
                // Placeholder content must never stand in for a real transcript
                Strategy::Default => match obtained_transcript.take() {
                    Some(transcript) => Ok(AssessmentResult {
                        transcript,
                        ..AssessmentResult::fallback_default(&failures.join("; "))
                    }),
                    None => self.assess_default(conversation_id, &failures, cancel).await,
                },
            };

            match outcome {
                Ok(mut result) => {
                    result.processing_time_ms = started.elapsed().as_millis() as u64;
                    if strategy != Strategy::Default {
                        self.cache.put(conversation_id, result.clone());
                    }
                    tracing::info!(
                        conversation_id,
                        strategy = %strategy,
                        risk_level = %result.risk_level,
                        source = result.source.as_str(),
                        processing_time_ms = result.processing_time_ms,
                        "Assessment complete"
                    );
                    return Ok(result);
                }
                Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
                Err(err) => {
                    tracing::warn!(
                        conversation_id,
                        strategy = %strategy,
                        error = %err,
                        "Assessment strategy failed, falling through"
                    );
                    failures.push(format!("{}: {}", strategy, err));
                }
            }
        }

        Ok(AssessmentResult::fallback_default(&failures.join("; ")))
    }

    /// Single probe for a currently fetchable recording, no retry
    ///
    /// `Ok(false)` only when the provider reports no recording or an expired
    /// one. Any other failure is returned so callers can tell "absent" from
    /// "could not check".
    pub async fn has_fetchable_recording(
        &self,
        conversation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ProviderError> {
        let probe = retry_with_backoff(
            "probe recording locator",
            &RetryPolicy::no_retry(),
            cancel,
            || self.calls.fetch_fresh_recording_locator(conversation_id),
        )
        .await;

        match probe {
            Ok(_) => Ok(true),
            Err(err @ (ProviderError::NotFound(_) | ProviderError::LocatorExpired)) => {
                tracing::debug!(conversation_id, error = %err, "No fetchable recording");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn assess_audio(
        &self,
        conversation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AssessmentResult, ProviderError> {
        // Locators expire within minutes: always fetch a new one
        let locator = retry_with_backoff(
            "fetch recording locator",
            &self.retry_policy,
            cancel,
            || self.calls.fetch_fresh_recording_locator(conversation_id),
        )
        .await?;

        let audio = retry_with_backoff("download recording", &self.retry_policy, cancel, || {
            self.calls.download_recording(&locator)
        })
        .await?;

        let content = AnalysisContent::Audio(audio);
        let instructions = audio_instructions();
        let raw = retry_with_backoff("submit audio analysis", &self.retry_policy, cancel, || {
            self.analysis.submit_for_analysis(&content, &instructions)
        })
        .await?;

        validate_analysis(&raw, AnalysisSource::Audio)
    }

    /// Stored transcript, else one rendered from provider messages
    ///
    /// Truncated to the analysis limit. `NotFound` when neither source has
    /// any text.
    async fn obtain_transcript(
        &self,
        conversation_id: &str,
        known_transcript: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let transcript = match known_transcript {
            Some(stored) => stored.to_string(),
            None => {
                let messages = retry_with_backoff(
                    "fetch transcript messages",
                    &self.retry_policy,
                    cancel,
                    || self.calls.fetch_transcript_messages(conversation_id),
                )
                .await?;
                render_transcript(&messages)
            }
        };

        if transcript.trim().is_empty() {
            return Err(ProviderError::NotFound(format!(
                "transcript for call {}",
                conversation_id
            )));
        }
        Ok(truncate_chars(&transcript, MAX_TRANSCRIPT_CHARS))
    }

    async fn assess_text(
        &self,
        conversation_id: &str,
        transcript: String,
        cancel: &CancellationToken,
    ) -> Result<AssessmentResult, ProviderError> {
        let text_key = text_fingerprint(&transcript);
        if let Some(hit) = self.cache.get(&text_key) {
            tracing::debug!(conversation_id, "Text assessment served from cache");
            return Ok(AssessmentResult {
                transcript,
                ..hit.as_cached()
            });
        }

        let content = AnalysisContent::Text(transcript.clone());
        let instructions = text_instructions();
        let raw = retry_with_backoff("submit text analysis", &self.retry_policy, cancel, || {
            self.analysis.submit_for_analysis(&content, &instructions)
        })
        .await?;

        let mut result = validate_analysis(&raw, AnalysisSource::Text)?;
        result.transcript = transcript;
        self.cache.put(&text_key, result.clone());
        Ok(result)
    }

    /// Placeholder submission labelled `fallback-default`; degrades to the
    /// static `unknown` result when the provider cannot be reached either
    async fn assess_default(
        &self,
        conversation_id: &str,
        failures: &[String],
        cancel: &CancellationToken,
    ) -> Result<AssessmentResult, ProviderError> {
        let content = AnalysisContent::Text(NO_CONTENT_PLACEHOLDER.to_string());
        let instructions = text_instructions();
        let submitted = retry_with_backoff("submit placeholder analysis", &self.retry_policy, cancel, || {
            self.analysis.submit_for_analysis(&content, &instructions)
        })
        .await;

        let reason = if failures.is_empty() {
            "no recording or transcript".to_string()
        } else {
            failures.join("; ")
        };

        match submitted.and_then(|raw| validate_analysis(&raw, AnalysisSource::FallbackDefault)) {
            Ok(result) => Ok(result),
            Err(ProviderError::Cancelled) => Err(ProviderError::Cancelled),
            Err(err) => {
                tracing::warn!(
                    conversation_id,
                    error = %err,
                    "Placeholder analysis failed, using degraded default"
                );
                Ok(AssessmentResult::fallback_default(&reason))
            }
        }
    }
}
