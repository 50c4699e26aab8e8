//! Read-only access to `provider_credentials`.

use sqlx::SqlitePool;

use super::models::ProviderCredentialRow;
use super::with_timeout;

#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        tenant_id: &str,
        provider_name: &str,
    ) -> Result<Option<ProviderCredentialRow>, sqlx::Error> {
        with_timeout(async {
            sqlx::query_as(
                "SELECT * FROM provider_credentials WHERE tenant_id = ? AND provider_name = ?",
            )
            .bind(tenant_id)
            .bind(provider_name)
            .fetch_optional(&self.pool)
            .await
        })
        .await
    }
}
