//! callguard-risk - Risk Assessment Service
//!
//! Ingests ended voice calls, obtains a structured mental-health risk
//! assessment from the AI analysis provider, keeps a queryable record per
//! conversation, and raises an alert when a caller needs immediate help.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use callguard_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use callguard_common::events::EventBus;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use callguard_risk::config::{resolve_credential, CredentialKind, ServiceSettings};
use callguard_risk::db::SqliteConversationStore;
use callguard_risk::services::{
    spawn_alert_log_sink, AnalysisCache, AnalysisProviderClient, EventBusAlerter, Pipeline,
    VoiceProviderClient,
};
use callguard_risk::AppState;

const MODULE_NAME: &str = "callguard-risk";

/// Command-line arguments for callguard-risk
#[derive(Parser, Debug)]
#[command(name = "callguard-risk")]
#[command(about = "Conversation risk-assessment service for CallGuard")]
#[command(version)]
struct Args {
    /// Listen address (overrides TOML `bind_address`)
    #[arg(short, long, env = "CALLGUARD_BIND_ADDRESS")]
    bind: Option<String>,

    /// Root folder holding the database
    #[arg(short, long, env = "CALLGUARD_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/callguard/callguard-risk.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    // Initialize tracing (RUST_LOG wins over the TOML level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{} ({})", MODULE_NAME, env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let mut settings = ServiceSettings::from_toml(&toml_config);
    if let Some(bind) = args.bind {
        settings.bind_address = bind;
    }

    // Root folder and database
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = callguard_risk::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    // Provider credentials: missing keys are not fatal, provider calls
    // fail with MissingCredentials until one is configured
    let voice_key = resolve_credential(&db_pool, &toml_config, CredentialKind::Voice).await?;
    let analysis_key = resolve_credential(&db_pool, &toml_config, CredentialKind::Analysis).await?;
    for (kind, key) in [
        (CredentialKind::Voice, &voice_key),
        (CredentialKind::Analysis, &analysis_key),
    ] {
        if key.is_none() {
            warn!(
                "{} not configured (settings table, {} or TOML); provider calls will fail",
                kind.label(),
                kind.env_var()
            );
        }
    }

    let voice_client = VoiceProviderClient::new(&settings.voice_api_base_url, voice_key)
        .context("Failed to build voice provider client")?
        .with_timeouts(settings.metadata_timeout, settings.download_timeout)
        .with_requests_per_second(settings.provider_requests_per_second);
    let analysis_client = AnalysisProviderClient::new(
        &settings.analysis_api_base_url,
        &settings.analysis_model,
        analysis_key,
    )
    .context("Failed to build analysis provider client")?
    .with_timeouts(settings.text_analysis_timeout, settings.audio_analysis_timeout);

    let event_bus = EventBus::new(256);
    let alert_sink = spawn_alert_log_sink(&event_bus);

    let cache = Arc::new(AnalysisCache::new(settings.cache_ttl, settings.cache_capacity));
    let pipeline = Pipeline::new(
        Arc::new(SqliteConversationStore::new(db_pool.clone())),
        Arc::new(voice_client),
        Arc::new(analysis_client),
        Arc::new(EventBusAlerter::new(event_bus.clone())),
        cache,
        event_bus.clone(),
        &settings,
    );

    let state = AppState::new(db_pool, event_bus, pipeline);
    let shutdown = state.shutdown.clone();
    let app = callguard_risk::build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_address))?;
    info!("Listening on http://{}", settings.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop in-flight batches between groups and pending retries
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    alert_sink.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
