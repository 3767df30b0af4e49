//! Analysis response validation
//!
//! The analysis provider is an LLM: its output is untrusted. Everything it
//! returns is parsed leniently, mapped onto the internal enums, and clamped
//! to fixed bounds before it can reach a stored record.

use serde_json::{Map, Value};

use super::provider::ProviderError;
use crate::models::{AnalysisSource, AssessmentResult, CounselingRecommendation, RiskLevel};

pub const MAX_SUMMARY_CHARS: usize = 2000;
pub const MAX_RECOMMENDATIONS_CHARS: usize = 2000;
pub const MAX_EMOTIONAL_STATE_CHARS: usize = 200;
pub const MAX_LANGUAGE_CHARS: usize = 50;
pub const MAX_TRANSCRIPT_CHARS: usize = 100_000;
pub const MAX_PHRASES: usize = 10;
pub const MAX_PHRASE_CHARS: usize = 200;

/// Extract the JSON object from provider text output
///
/// Accepts bare JSON, JSON wrapped in markdown code fences, or JSON embedded
/// in surrounding prose (first `{` to last `}`).
pub fn parse_analysis_text(text: &str) -> Result<Value, ProviderError> {
    let trimmed = strip_code_fence(text.trim());

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(first_err) => {
            let start = trimmed.find('{');
            let end = trimmed.rfind('}');
            match (start, end) {
                (Some(start), Some(end)) if end > start => {
                    serde_json::from_str::<Value>(&trimmed[start..=end]).map_err(|e| {
                        ProviderError::InvalidResponse(format!("unparseable JSON: {}", e))
                    })?
                }
                _ => {
                    return Err(ProviderError::InvalidResponse(format!(
                        "no JSON object in response: {}",
                        first_err
                    )))
                }
            }
        }
    };

    if !value.is_object() {
        return Err(ProviderError::InvalidResponse(
            "response is not a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line ("json", "JSON", ...)
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Map a raw provider object onto an `AssessmentResult`
///
/// `transcript` is only read from the object for the audio path; the text
/// path already knows its transcript and the engine sets it.
pub fn validate_analysis(raw: &Value, source: AnalysisSource) -> Result<AssessmentResult, ProviderError> {
    let object = raw.as_object().ok_or_else(|| {
        ProviderError::InvalidResponse("analysis result is not a JSON object".to_string())
    })?;

    let transcript = if source == AnalysisSource::Audio {
        capped_string(object, "transcript", MAX_TRANSCRIPT_CHARS)
    } else {
        String::new()
    };

    let language = capped_string(object, "language_used", MAX_LANGUAGE_CHARS);

    Ok(AssessmentResult {
        transcript,
        risk_level: object
            .get("risk_level")
            .and_then(Value::as_str)
            .map(RiskLevel::parse_lenient)
            .unwrap_or(RiskLevel::Unknown),
        counseling: parse_counseling(object.get("counseling_needed")),
        immediate_intervention: parse_flag(object.get("immediate_intervention")),
        emotional_state: capped_string(object, "emotional_state", MAX_EMOTIONAL_STATE_CHARS),
        concerning_phrases: parse_phrases(object.get("concerning_phrases")),
        summary: capped_string(object, "assessment_summary", MAX_SUMMARY_CHARS),
        confidence: parse_confidence(object.get("confidence_level")),
        language: (!language.is_empty()).then_some(language),
        recommendations: parse_recommendations(object.get("support_recommendations")),
        source,
        processing_time_ms: 0,
    })
}

/// Truncate to at most `max` characters (not bytes)
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn capped_string(object: &Map<String, Value>, key: &str, max: usize) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(|s| truncate_chars(s.trim(), max))
        .unwrap_or_default()
}

fn parse_counseling(value: Option<&Value>) -> CounselingRecommendation {
    match value {
        Some(Value::Bool(true)) => CounselingRecommendation::Advised,
        Some(Value::String(s)) => CounselingRecommendation::parse_lenient(s),
        _ => CounselingRecommendation::None,
    }
}

fn parse_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "1"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn parse_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "low" => 0.3,
            "medium" => 0.6,
            "high" => 0.9,
            other => other.parse::<f64>().unwrap_or(0.0),
        },
        _ => 0.0,
    };

    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

fn parse_phrases(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&str> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(s)) => vec![s.as_str()],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_PHRASES)
        .map(|s| truncate_chars(s, MAX_PHRASE_CHARS))
        .collect()
}

fn parse_recommendations(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };
    truncate_chars(&text, MAX_RECOMMENDATIONS_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"risk_level\": \"high\"}\n```";
        let value = parse_analysis_text(text).unwrap();
        assert_eq!(value["risk_level"], "high");
    }

    #[test]
    fn test_parse_json_inside_prose() {
        let text = "Here is the assessment: {\"risk_level\": \"low\"} Let me know.";
        let value = parse_analysis_text(text).unwrap();
        assert_eq!(value["risk_level"], "low");
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            parse_analysis_text("[1, 2, 3]"),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_analysis_text("I cannot help with that."),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_validate_full_audio_response() {
        let raw = json!({
            "risk_level": "High",
            "counseling_needed": "required",
            "immediate_intervention": "yes",
            "emotional_state": "distressed",
            "concerning_phrases": ["I don't see a way out"],
            "assessment_summary": "Caller expressed hopelessness.",
            "confidence_level": "high",
            "language_used": "en",
            "support_recommendations": ["Call back within 24h", "Share crisis line"],
            "transcript": "Caller: I don't see a way out"
        });

        let result = validate_analysis(&raw, AnalysisSource::Audio).unwrap();
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.counseling, CounselingRecommendation::Required);
        assert!(result.immediate_intervention);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.language.as_deref(), Some("en"));
        assert_eq!(result.recommendations, "Call back within 24h\nShare crisis line");
        assert_eq!(result.transcript, "Caller: I don't see a way out");
        assert_eq!(result.risk_score(), 7);
    }

    #[test]
    fn test_text_path_ignores_provider_transcript() {
        let raw = json!({ "risk_level": "low", "transcript": "invented" });
        let result = validate_analysis(&raw, AnalysisSource::Text).unwrap();
        assert!(result.transcript.is_empty());
    }

    #[test]
    fn test_unrecognized_values_clamped() {
        let raw = json!({
            "risk_level": "apocalyptic",
            "counseling_needed": false,
            "immediate_intervention": "maybe",
            "confidence_level": 7.5,
            "language_used": "",
        });

        let result = validate_analysis(&raw, AnalysisSource::Text).unwrap();
        assert_eq!(result.risk_level, RiskLevel::Unknown);
        assert_eq!(result.counseling, CounselingRecommendation::None);
        assert!(!result.immediate_intervention);
        assert_eq!(result.confidence, 1.0);
        assert!(result.language.is_none());
    }

    #[test]
    fn test_boolean_forms_accepted() {
        let raw = json!({ "counseling_needed": true, "immediate_intervention": 1, "confidence_level": "0.42" });
        let result = validate_analysis(&raw, AnalysisSource::Text).unwrap();
        assert_eq!(result.counseling, CounselingRecommendation::Advised);
        assert!(result.immediate_intervention);
        assert!((result.confidence - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn test_length_caps() {
        let raw = json!({
            "assessment_summary": "s".repeat(5000),
            "emotional_state": "e".repeat(500),
            "concerning_phrases": (0..25).map(|i| format!("{}{}", i, "p".repeat(300))).collect::<Vec<_>>(),
        });

        let result = validate_analysis(&raw, AnalysisSource::Text).unwrap();
        assert_eq!(result.summary.chars().count(), MAX_SUMMARY_CHARS);
        assert_eq!(result.emotional_state.chars().count(), MAX_EMOTIONAL_STATE_CHARS);
        assert_eq!(result.concerning_phrases.len(), MAX_PHRASES);
        assert!(result
            .concerning_phrases
            .iter()
            .all(|p| p.chars().count() <= MAX_PHRASE_CHARS));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[test]
    fn test_non_object_is_invalid() {
        assert!(matches!(
            validate_analysis(&json!("high"), AnalysisSource::Text),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
