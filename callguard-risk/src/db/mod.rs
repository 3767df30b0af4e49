//! Database access for callguard-risk
//!
//! The pool itself (file, WAL, busy timeout, `settings` table) comes from
//! `callguard_common::db`; this module adds the service's own tables.

pub mod conversations;
pub mod settings;

pub use conversations::{ConversationStore, SqliteConversationStore};

use callguard_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the database file and create all tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = callguard_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create callguard-risk tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    callguard_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            telephony_call_ref TEXT,
            originator TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            transcript TEXT NOT NULL DEFAULT '',
            recording_ref TEXT,
            risk_level TEXT NOT NULL DEFAULT 'unknown',
            counseling_recommendation TEXT NOT NULL DEFAULT 'none',
            risk_score INTEGER NOT NULL DEFAULT 0,
            immediate_intervention INTEGER NOT NULL DEFAULT 0,
            assessment_summary TEXT NOT NULL DEFAULT '',
            emotional_state TEXT NOT NULL DEFAULT '',
            concerning_phrases TEXT NOT NULL DEFAULT '[]',
            support_recommendations TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0.0,
            language TEXT,
            lifecycle_status TEXT NOT NULL DEFAULT 'active',
            last_analysis_source TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_call_ref ON conversations(telephony_call_ref)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, conversations)");

    Ok(())
}
