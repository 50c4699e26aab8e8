//! Recipient resolution — reads of the
//! surrounding application's attendee and profile tables, scoped to the
//! columns this core consumes.

use sqlx::SqlitePool;

use super::with_timeout;

#[derive(Clone)]
pub struct RecipientStore {
    pool: SqlitePool,
}

impl RecipientStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Distinct confirmed, non-empty emails for the template's event.
    pub async fn event_attendees(&self, tenant_id: &str, event_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = with_timeout(async {
            sqlx::query_as(
                "SELECT DISTINCT email FROM event_attendees
                 WHERE tenant_id = ? AND event_id = ? AND confirmed = 1 AND email <> ''
                 ORDER BY email",
            )
            .bind(tenant_id)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
        })
        .await?;
        Ok(rows.into_iter().map(|(e,)| e).collect())
    }

    /// Distinct opted-in emails within the tenant.
    pub async fn subscribed_members(&self, tenant_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = with_timeout(async {
            sqlx::query_as(
                "SELECT DISTINCT email FROM user_profiles
                 WHERE tenant_id = ? AND email_opted_in = 1 AND email <> ''
                 ORDER BY email",
            )
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
        })
        .await?;
        Ok(rows.into_iter().map(|(e,)| e).collect())
    }
}
