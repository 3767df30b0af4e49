//! Configuration resolution for callguard-risk
//!
//! Provider credentials resolve with Database → ENV → TOML priority.
//! Pipeline tunables come from the TOML `[pipeline]` table with built-in
//! defaults for anything unset.

use callguard_common::config::TomlConfig;
use callguard_common::Result;
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::{info, warn};

use crate::services::analysis_cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::services::analysis_provider_client::{
    DEFAULT_ANALYSIS_API_BASE_URL, DEFAULT_ANALYSIS_MODEL, DEFAULT_AUDIO_TIMEOUT,
    DEFAULT_TEXT_TIMEOUT,
};
use crate::services::reconciliation::BatchSettings;
use crate::services::voice_provider_client::{
    DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_METADATA_TIMEOUT, DEFAULT_REQUESTS_PER_SECOND,
    DEFAULT_VOICE_API_BASE_URL,
};
use crate::utils::RetryPolicy;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";

/// Which provider a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Voice,
    Analysis,
}

impl CredentialKind {
    pub fn env_var(&self) -> &'static str {
        match self {
            CredentialKind::Voice => "CALLGUARD_VOICE_API_KEY",
            CredentialKind::Analysis => "CALLGUARD_ANALYSIS_API_KEY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CredentialKind::Voice => "Voice provider API key",
            CredentialKind::Analysis => "Analysis provider API key",
        }
    }

    fn toml_value<'a>(&self, toml_config: &'a TomlConfig) -> Option<&'a String> {
        match self {
            CredentialKind::Voice => toml_config.voice_api_key.as_ref(),
            CredentialKind::Analysis => toml_config.analysis_api_key.as_ref(),
        }
    }

    async fn database_value(&self, db: &Pool<Sqlite>) -> Result<Option<String>> {
        match self {
            CredentialKind::Voice => crate::db::settings::get_voice_api_key(db).await,
            CredentialKind::Analysis => crate::db::settings::get_analysis_api_key(db).await,
        }
    }
}

/// Resolve a provider credential from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
///
/// `Ok(None)` when no tier holds a usable key. The service still starts;
/// every call to that provider then fails with `MissingCredentials`.
pub async fn resolve_credential(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
    kind: CredentialKind,
) -> Result<Option<String>> {
    let db_key = kind.database_value(db).await?.filter(|k| is_valid_key(k));
    let env_key = std::env::var(kind.env_var()).ok().filter(|k| is_valid_key(k));
    let toml_key = kind.toml_value(toml_config).filter(|k| is_valid_key(k)).cloned();

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            kind.label(),
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(source) = sources.first() {
        info!("{} loaded from {}", kind.label(), source);
    }

    Ok(db_key.or(env_key).or(toml_key))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Effective runtime settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub bind_address: String,
    pub voice_api_base_url: String,
    pub analysis_api_base_url: String,
    pub analysis_model: String,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub retry_policy: RetryPolicy,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
    pub text_analysis_timeout: Duration,
    pub audio_analysis_timeout: Duration,
    pub provider_requests_per_second: u32,
    pub batch: BatchSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            voice_api_base_url: DEFAULT_VOICE_API_BASE_URL.to_string(),
            analysis_api_base_url: DEFAULT_ANALYSIS_API_BASE_URL.to_string(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            retry_policy: RetryPolicy::default(),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            text_analysis_timeout: DEFAULT_TEXT_TIMEOUT,
            audio_analysis_timeout: DEFAULT_AUDIO_TIMEOUT,
            provider_requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            batch: BatchSettings::default(),
        }
    }
}

impl ServiceSettings {
    /// Overlay TOML values on the defaults
    pub fn from_toml(toml_config: &TomlConfig) -> Self {
        let defaults = Self::default();
        let pipeline = &toml_config.pipeline;
        let secs = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_secs).unwrap_or(default)
        };
        let millis = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };

        let retry_policy = RetryPolicy {
            max_attempts: pipeline
                .retry_max_attempts
                .unwrap_or(defaults.retry_policy.max_attempts)
                .max(1),
            base_delay: millis(pipeline.retry_base_delay_ms, defaults.retry_policy.base_delay),
            max_delay: defaults.retry_policy.max_delay,
        };

        let batch = BatchSettings {
            import_group_size: pipeline
                .import_group_size
                .unwrap_or(defaults.batch.import_group_size)
                .max(1),
            import_group_delay: millis(
                pipeline.import_group_delay_ms,
                defaults.batch.import_group_delay,
            ),
            validate_group_size: pipeline
                .validate_group_size
                .unwrap_or(defaults.batch.validate_group_size)
                .max(1),
            validate_group_delay: millis(
                pipeline.validate_group_delay_ms,
                defaults.batch.validate_group_delay,
            ),
        };

        Self {
            bind_address: toml_config
                .bind_address
                .clone()
                .unwrap_or(defaults.bind_address),
            voice_api_base_url: toml_config
                .voice_api_base_url
                .clone()
                .unwrap_or(defaults.voice_api_base_url),
            analysis_api_base_url: toml_config
                .analysis_api_base_url
                .clone()
                .unwrap_or(defaults.analysis_api_base_url),
            analysis_model: toml_config
                .analysis_model
                .clone()
                .unwrap_or(defaults.analysis_model),
            cache_ttl: secs(pipeline.cache_ttl_secs, defaults.cache_ttl),
            cache_capacity: pipeline.cache_capacity.unwrap_or(defaults.cache_capacity).max(1),
            retry_policy,
            metadata_timeout: secs(pipeline.metadata_timeout_secs, defaults.metadata_timeout),
            download_timeout: defaults.download_timeout,
            text_analysis_timeout: secs(
                pipeline.text_analysis_timeout_secs,
                defaults.text_analysis_timeout,
            ),
            audio_analysis_timeout: secs(
                pipeline.audio_analysis_timeout_secs,
                defaults.audio_analysis_timeout,
            ),
            provider_requests_per_second: pipeline
                .provider_requests_per_second
                .unwrap_or(defaults.provider_requests_per_second)
                .max(1),
            batch,
        }
    }
}
