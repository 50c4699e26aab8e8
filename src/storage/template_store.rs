//! `promotion_email_templates` and the append-only `promotion_email_sent_log`.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{now_rfc3339, EmailStatus, PromotionEmailTemplateRow};
use super::with_timeout;

#[derive(Clone)]
pub struct TemplateStore {
    pool: SqlitePool,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        template_id: &str,
        tenant_id: &str,
    ) -> Result<Option<PromotionEmailTemplateRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM promotion_email_templates WHERE id = ? AND tenant_id = ?",
            )
            .bind(template_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
        })
        .await
    }

    /// Append one terminal-status row per attempted send.
    /// `template_id` is preserved nullably — losing the owning template later
    /// does not destroy the audit trail.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_sent_log(
        &self,
        tenant_id: &str,
        template_id: Option<&str>,
        event_id: Option<&str>,
        recipient_email: &str,
        subject: &str,
        is_test_email: bool,
        status: EmailStatus,
        error_message: Option<&str>,
        sent_by_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        with_timeout(async {
            sqlx::query(
                "INSERT INTO promotion_email_sent_log
                    (id, tenant_id, template_id, event_id, recipient_email, subject, sent_at, is_test_email, email_status, error_message, sent_by_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(tenant_id)
            .bind(template_id)
            .bind(event_id)
            .bind(recipient_email)
            .bind(subject)
            .bind(now_rfc3339())
            .bind(is_test_email)
            .bind(status.as_str())
            .bind(error_message)
            .bind(sent_by_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}
