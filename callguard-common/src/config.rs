//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `CALLGUARD_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the module TOML file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CALLGUARD_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "callguard.db";

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "callguard_risk=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Pipeline tuning section of the TOML file
///
/// Every field is optional; services apply their own defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub cache_ttl_secs: Option<u64>,
    pub cache_capacity: Option<usize>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub metadata_timeout_secs: Option<u64>,
    pub text_analysis_timeout_secs: Option<u64>,
    pub audio_analysis_timeout_secs: Option<u64>,
    pub import_group_size: Option<usize>,
    pub import_group_delay_ms: Option<u64>,
    pub validate_group_size: Option<usize>,
    pub validate_group_delay_ms: Option<u64>,
    pub provider_requests_per_second: Option<u32>,
}

/// Module TOML configuration
///
/// Missing file or missing keys are never fatal: all fields default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP listen address (e.g. "127.0.0.1:5790")
    #[serde(default)]
    pub bind_address: Option<String>,

    /// Voice/recording provider API key
    #[serde(default)]
    pub voice_api_key: Option<String>,

    /// Voice/recording provider base URL
    #[serde(default)]
    pub voice_api_base_url: Option<String>,

    /// AI analysis provider API key
    #[serde(default)]
    pub analysis_api_key: Option<String>,

    /// AI analysis provider base URL
    #[serde(default)]
    pub analysis_api_base_url: Option<String>,

    /// AI analysis model name
    #[serde(default)]
    pub analysis_model: Option<String>,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Use a command-line supplied folder (highest priority)
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Resolve root folder; never fails, falls back to the compiled default
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(config_path) = default_config_path(&self.module_name) {
            match load_toml_config(&config_path) {
                Ok(config) => {
                    if let Some(root) = config.root_folder {
                        return root;
                    }
                }
                Err(e) => {
                    warn!(
                        module = %self.module_name,
                        error = %e,
                        "Failed to read TOML config, using default root folder"
                    );
                }
            }
        }

        default_root_folder()
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create root folder directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// Platform config file path: `<config_dir>/callguard/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("callguard").join(format!("{}.toml", module_name)))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("callguard"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/callguard"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("callguard"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/callguard"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("callguard"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\callguard"))
    } else {
        PathBuf::from("./callguard_data")
    }
}

/// Load TOML config; a missing file yields the defaults
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}
