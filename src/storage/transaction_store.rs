//! `event_ticket_transactions` access, including the fee/tax backfiller's
//! selection query.

use sqlx::SqlitePool;

use super::models::EventTicketTransactionRow;
use super::with_timeout;

#[derive(Clone)]
pub struct TransactionStore {
    pool: SqlitePool,
}

impl TransactionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Rows where `status='COMPLETED'`, a payment intent is on file,
    /// `purchaseDate` falls in `[start, end)`, and either the fee is
    /// null/zero or `force_update` is set. Paged at `batch_size`, offset by
    /// `page * batch_size`.
    pub async fn select_candidates(
        &self,
        tenant_id: Option<&str>,
        event_id: Option<&str>,
        start: &str,
        end: &str,
        force_update: bool,
        batch_size: i64,
        page: i64,
    ) -> Result<Vec<EventTicketTransactionRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM event_ticket_transactions
                 WHERE status = 'COMPLETED'
                   AND stripe_payment_intent_id IS NOT NULL
                   AND purchase_date >= ? AND purchase_date <= ?
                   AND (? = 1 OR stripe_fee_amount IS NULL OR CAST(stripe_fee_amount AS REAL) = 0)
                   AND (? IS NULL OR tenant_id = ?)
                   AND (? IS NULL OR event_id = ?)
                 ORDER BY id
                 LIMIT ? OFFSET ?",
            )
            .bind(start)
            .bind(end)
            .bind(force_update)
            .bind(tenant_id)
            .bind(tenant_id)
            .bind(event_id)
            .bind(event_id)
            .bind(batch_size)
            .bind(page * batch_size)
            .fetch_all(&self.pool)
            .await
        })
        .await
    }

    pub async fn distinct_tenant_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = with_timeout(async {
            sqlx::query_as("SELECT DISTINCT tenant_id FROM event_ticket_transactions ORDER BY tenant_id")
                .fetch_all(&self.pool)
                .await
        })
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Reload by id immediately before writing, to avoid stale-version
    /// overwrites.
    pub async fn reload(&self, id: &str) -> Result<Option<EventTicketTransactionRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as("SELECT * FROM event_ticket_transactions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }

    pub async fn apply_fee_tax(
        &self,
        id: &str,
        fee: &str,
        tax: Option<&str>,
        net: &str,
    ) -> Result<(), sqlx::Error> {
        with_timeout(async {
            sqlx::query(
                "UPDATE event_ticket_transactions
                 SET stripe_fee_amount = ?, stripe_amount_tax = ?, net_payout_amount = ?
                 WHERE id = ?",
            )
            .bind(fee)
            .bind(tax)
            .bind(net)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}
