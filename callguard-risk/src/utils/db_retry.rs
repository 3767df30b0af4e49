//! Database Retry Logic
//!
//! Transient SQLite lock contention ("database is locked") is retried through
//! the shared backoff loop; every other database error fails immediately.

use callguard_common::Error;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::retry::{retry_with_backoff, RetryClassify, RetryPolicy};

impl RetryClassify for Error {
    fn is_transient(&self) -> bool {
        match self {
            Error::Database(db_err) => is_lock_error(&db_err.to_string()),
            _ => false,
        }
    }

    fn cancelled() -> Self {
        Error::Internal("database operation cancelled".to_string())
    }
}

fn is_lock_error(message: &str) -> bool {
    message.contains("database is locked") || message.contains("database table is locked")
}

/// Backoff used for lock contention: 10ms, 20ms, 40ms ... capped at 1s
pub fn lock_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 8,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(1000),
    }
}

/// Retry a database operation while it fails with a lock error
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "conversation upsert")
/// * `operation` - Async closure that performs the database operation
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    // Writes are never abandoned half-way by a caller's cancellation
    let never_cancelled = CancellationToken::new();
    retry_with_backoff(operation_name, &lock_retry_policy(), &never_cancelled, operation).await
}
