//! Database Test Utilities

use async_trait::async_trait;
use callguard_common::Result;
use callguard_risk::db::{init_tables, ConversationStore, SqliteConversationStore};
use callguard_risk::models::ConversationRecord;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// In-memory database with all tables, wrapped in a write-counting store
pub async fn create_memory_store() -> (SqlitePool, CountingStore) {
    let pool = callguard_common::db::init_memory_database().await.unwrap();
    init_tables(&pool).await.unwrap();
    (pool.clone(), CountingStore::new(SqliteConversationStore::new(pool)))
}

/// File-backed database in a temp dir
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_file_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_callguard.db");
    let pool = callguard_risk::db::init_database_pool(&db_path).await.unwrap();
    (temp_dir, pool)
}

/// Store that counts upserts
pub struct CountingStore {
    inner: SqliteConversationStore,
    upserts: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: SqliteConversationStore) -> Self {
        Self {
            inner,
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationStore for CountingStore {
    async fn upsert(&self, record: &ConversationRecord) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(record).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ConversationRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_correlation_ref(
        &self,
        telephony_call_ref: &str,
    ) -> Result<Option<ConversationRecord>> {
        self.inner.find_by_correlation_ref(telephony_call_ref).await
    }

    async fn list_all(&self) -> Result<Vec<ConversationRecord>> {
        self.inner.list_all().await
    }
}
