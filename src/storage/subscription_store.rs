//! `membership_subscriptions` access, including the reconciler's candidate
//! selection query.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::models::MembershipSubscriptionRow;
use super::with_timeout;

#[derive(Clone)]
pub struct SubscriptionStore {
    pool: SqlitePool,
}

impl SubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Candidate selection for one tenant: `status ∈ {ACTIVE, TRIAL}`,
    /// `cancelAtPeriodEnd = false`, and either `currentPeriodEnd ≤ threshold`
    /// or (`currentPeriodEnd ≤ extended_threshold` and a Stripe id is on
    /// file) — the widened re-check window for rows Stripe may have already
    /// rolled.
    pub async fn select_candidates(
        &self,
        tenant_id: &str,
        renewal_threshold: NaiveDate,
        extended_threshold: NaiveDate,
    ) -> Result<Vec<MembershipSubscriptionRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM membership_subscriptions
                 WHERE tenant_id = ?
                   AND status IN ('ACTIVE', 'TRIAL')
                   AND cancel_at_period_end = 0
                   AND (
                        current_period_end <= ?
                        OR (current_period_end <= ? AND stripe_subscription_id IS NOT NULL)
                   )
                 ORDER BY id",
            )
            .bind(tenant_id)
            .bind(renewal_threshold.format("%Y-%m-%d").to_string())
            .bind(extended_threshold.format("%Y-%m-%d").to_string())
            .fetch_all(&self.pool)
            .await
        })
        .await
    }

    /// Single-subscription invocation: scope to one row within the tenant by
    /// its Stripe subscription id.
    pub async fn find_by_stripe_id(
        &self,
        tenant_id: &str,
        stripe_subscription_id: &str,
    ) -> Result<Vec<MembershipSubscriptionRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM membership_subscriptions WHERE tenant_id = ? AND stripe_subscription_id = ?",
            )
            .bind(tenant_id)
            .bind(stripe_subscription_id)
            .fetch_all(&self.pool)
            .await
        })
        .await
    }

    pub async fn distinct_tenant_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = with_timeout(async {
            sqlx::query_as("SELECT DISTINCT tenant_id FROM membership_subscriptions ORDER BY tenant_id")
                .fetch_all(&self.pool)
                .await
        })
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn apply_reconciliation(
        &self,
        id: &str,
        status: &str,
        current_period_start: NaiveDate,
        current_period_end: NaiveDate,
        cancel_at_period_end: bool,
        last_reconciliation_at: &str,
        reconciliation_status: &str,
        reconciliation_error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        with_timeout(async {
            sqlx::query(
                "UPDATE membership_subscriptions
                 SET status = ?, current_period_start = ?, current_period_end = ?, cancel_at_period_end = ?,
                     last_reconciliation_at = ?, reconciliation_status = ?, reconciliation_error = ?
                 WHERE id = ?",
            )
            .bind(status)
            .bind(current_period_start.format("%Y-%m-%d").to_string())
            .bind(current_period_end.format("%Y-%m-%d").to_string())
            .bind(cancel_at_period_end)
            .bind(last_reconciliation_at)
            .bind(reconciliation_status)
            .bind(reconciliation_error)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn mark_failed(
        &self,
        id: &str,
        last_reconciliation_at: &str,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        with_timeout(async {
            sqlx::query(
                "UPDATE membership_subscriptions
                 SET last_reconciliation_at = ?, reconciliation_status = 'FAILED', reconciliation_error = ?
                 WHERE id = ?",
            )
            .bind(last_reconciliation_at)
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn seed(pool: &SqlitePool) {
        sqlx::query(
            "INSERT INTO membership_subscriptions
                (id, tenant_id, user_profile_id, plan_id, status, current_period_start, current_period_end, cancel_at_period_end, stripe_subscription_id, reconciliation_status)
             VALUES ('s1', 't1', 'u1', 'p1', 'ACTIVE', '2025-02-20', '2025-03-20', 0, 'sub_1', 'PENDING')",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn selects_rows_due_for_renewal() {
        let storage = Storage::in_memory().await.unwrap();
        seed(&storage.pool()).await;
        let store = SubscriptionStore::new(storage.pool());

        let rows = store
            .select_candidates(
                "t1",
                NaiveDate::from_ymd_opt(2025, 3, 27).unwrap(),
                NaiveDate::from_ymd_opt(2025, 4, 27).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "s1");
    }

    #[tokio::test]
    async fn excludes_rows_already_cancelled() {
        let storage = Storage::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO membership_subscriptions
                (id, tenant_id, user_profile_id, plan_id, status, current_period_start, current_period_end, cancel_at_period_end, reconciliation_status)
             VALUES ('s2', 't1', 'u1', 'p1', 'ACTIVE', '2025-02-20', '2025-03-20', 1, 'PENDING')",
        )
        .execute(&storage.pool())
        .await
        .unwrap();
        let store = SubscriptionStore::new(storage.pool());

        let rows = store
            .select_candidates(
                "t1",
                NaiveDate::from_ymd_opt(2025, 3, 27).unwrap(),
                NaiveDate::from_ymd_opt(2025, 4, 27).unwrap(),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
