//! Job Execution Ledger — the only source of truth for "did this run occur?"

use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{now_rfc3339, parse_rfc3339, JobExecutionRow, JobStatus, JobType};
use super::with_timeout;

#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Best-effort sequence-synchronisation hook run before `create`.
    /// SQLite's `INTEGER PRIMARY KEY`/TEXT-uuid scheme has no autoincrement
    /// sequence to drift, so this is a no-op that exists to mirror the
    /// teacher's defensive-startup shape; failures here are logged and
    /// ignored, never propagated.
    pub async fn sync_sequence(&self) {
        if let Err(e) = sqlx::query("PRAGMA optimize").execute(&self.pool).await {
            tracing::warn!(error = %e, "ledger sequence-sync hook failed — ignoring");
        }
    }

    pub async fn create(
        &self,
        job_name: &str,
        job_type: JobType,
        tenant_id: Option<&str>,
        triggered_by: Option<&str>,
        parameters_json: Option<&str>,
    ) -> Result<String, sqlx::Error> {
        self.sync_sequence().await;
        let id = Uuid::new_v4().to_string();
        let started_at = now_rfc3339();
        with_timeout(async {
            sqlx::query(
                "INSERT INTO job_executions
                    (id, job_name, job_type, tenant_id, status, started_at, processed, success, failed, skipped, triggered_by, parameters_json)
                 VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?, ?)",
            )
            .bind(&id)
            .bind(job_name)
            .bind(job_type.as_str())
            .bind(tenant_id)
            .bind(JobStatus::Running.as_str())
            .bind(&started_at)
            .bind(triggered_by)
            .bind(parameters_json)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    /// Mark a job complete. `durationMs = completedAt - startedAt`, computed
    /// server-side from the stored `started_at` so clock skew between the
    /// caller and the row can't desync the two.
    pub async fn complete(
        &self,
        id: &str,
        status: JobStatus,
        processed: i64,
        success: i64,
        failed: i64,
        skipped: i64,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let row: JobExecutionRow = with_timeout(async {
            sqlx::query_as("SELECT * FROM job_executions WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await
        })
        .await?;

        let completed_at = now_rfc3339();
        let duration_ms = match (parse_rfc3339(&row.started_at), parse_rfc3339(&completed_at)) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
            _ => 0,
        };

        with_timeout(async {
            sqlx::query(
                "UPDATE job_executions
                 SET status = ?, completed_at = ?, duration_ms = ?, processed = ?, success = ?, failed = ?, skipped = ?, error_message = ?
                 WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(&completed_at)
            .bind(duration_ms)
            .bind(processed)
            .bind(success)
            .bind(failed)
            .bind(skipped)
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<JobExecutionRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as("SELECT * FROM job_executions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[tokio::test]
    async fn create_then_complete_computes_duration() {
        let storage = Storage::in_memory().await.unwrap();
        let ledger = LedgerStore::new(storage.pool());

        let id = ledger
            .create("nightly-renewal", JobType::SubscriptionRenewal, None, Some("cron"), None)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ledger.complete(&id, JobStatus::Completed, 3, 2, 1, 0, None).await.unwrap();

        let row = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, "COMPLETED");
        assert_eq!(row.processed, 3);
        assert!(row.duration_ms.unwrap() >= 0);
        assert_eq!(row.processed, row.success + row.failed + row.skipped);
    }

    #[tokio::test]
    async fn ids_are_not_reused_across_runs() {
        let storage = Storage::in_memory().await.unwrap();
        let ledger = LedgerStore::new(storage.pool());
        let id1 = ledger.create("a", JobType::EmailBatch, None, None, None).await.unwrap();
        let id2 = ledger.create("b", JobType::EmailBatch, None, None, None).await.unwrap();
        assert_ne!(id1, id2);
    }
}
