//! `tenant_settings` access — only the three columns the core reads.

use sqlx::SqlitePool;

use super::models::TenantSettingsRow;
use super::with_timeout;

#[derive(Clone)]
pub struct TenantSettingsStore {
    pool: SqlitePool,
}

impl TenantSettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, tenant_id: &str) -> Result<Option<TenantSettingsRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as("SELECT * FROM tenant_settings WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }
}
