//! Append-only `reconciliation_log`.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{now_rfc3339, ReconciliationOutcome};
use super::with_timeout;

#[derive(Clone)]
pub struct ReconciliationStore {
    pool: SqlitePool,
}

impl ReconciliationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        before_status: &str,
        after_status: &str,
        before_period_end: &str,
        after_period_end: &str,
        outcome: ReconciliationOutcome,
        detail: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        with_timeout(async {
            sqlx::query(
                "INSERT INTO reconciliation_log
                    (id, tenant_id, subscription_id, before_status, after_status, before_period_end, after_period_end, reconciled_at, outcome, detail)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(tenant_id)
            .bind(subscription_id)
            .bind(before_status)
            .bind(after_status)
            .bind(before_period_end)
            .bind(after_period_end)
            .bind(now_rfc3339())
            .bind(outcome.as_str())
            .bind(detail)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}
