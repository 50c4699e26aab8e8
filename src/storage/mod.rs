//! SQLite-backed persistence layer.
//!
//! The database driver is a swappable implementation detail;
//! SQLite in WAL mode is the one this crate ships, following the teacher's
//! storage layer shape — a single connection pool, schema applied via
//! embedded migrations, and a query timeout wrapping every call.

pub mod models;
pub mod credential_store;
pub mod ledger_store;
pub mod recipient_store;
pub mod reconciliation_store;
pub mod subscription_store;
pub mod template_store;
pub mod tenant_settings_store;
pub mod transaction_store;

use anyhow::Result;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Default timeout for individual SQLite queries, so a stuck connection
/// cannot hang a workflow indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T, sqlx::Error>>) -> Result<T, sqlx::Error> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(sqlx::Error::PoolTimedOut),
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("batchd.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database, for tests and ephemeral trigger-only deployments.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        for sql in [
            include_str!("migrations/001_job_executions.sql"),
            include_str!("migrations/002_provider_credentials.sql"),
            include_str!("migrations/003_membership_subscriptions.sql"),
            include_str!("migrations/004_event_ticket_transactions.sql"),
            include_str!("migrations/005_promotion_email.sql"),
            include_str!("migrations/006_tenant_settings.sql"),
            include_str!("migrations/007_reconciliation_log.sql"),
            include_str!("migrations/008_recipients.sql"),
        ] {
            for stmt in sql.split(';') {
                let stmt = stmt.trim();
                if !stmt.is_empty() {
                    sqlx::query(stmt).execute(pool).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrates_clean_in_memory_database() {
        let storage = Storage::in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_executions")
            .fetch_one(&storage.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
