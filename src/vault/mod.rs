//! Credential Vault — decrypts per-tenant provider secrets and caches
//! the result (including negative results) for the lifetime of one batch run.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use crate::crypto::{self, CryptoError};
use crate::errors::BatchError;
use crate::storage::credential_store::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VaultFailure {
    KeyNotConfigured,
    Undecryptable,
    TenantUnconfigured,
}

impl VaultFailure {
    fn as_str(&self) -> &'static str {
        match self {
            VaultFailure::KeyNotConfigured => "key_not_configured",
            VaultFailure::Undecryptable => "undecryptable",
            VaultFailure::TenantUnconfigured => "tenant_unconfigured",
        }
    }
}

/// Cache key: `(tenantId, providerName)`. The fee/tax workflow also looks
/// tenants up by a bare tenant key (providerName fixed to "STRIPE") —
/// callers that only ever read one provider per tenant pass that constant.
type CacheKey = (String, String);

pub struct CredentialVault {
    encryption_key: [u8; 32],
    store: CredentialStore,
    cache: RwLock<HashMap<CacheKey, Option<Arc<str>>>>,
}

impl CredentialVault {
    pub fn new(encryption_key: [u8; 32], store: CredentialStore) -> Self {
        Self {
            encryption_key,
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Clear the per-run cache. Called at the start of every new batch run of
    /// the fee/tax workflow so a rotated secret isn't served stale.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// `getProviderSecret(tenantId, providerName) -> plaintext | absent`.
    ///
    /// Every failure path (missing record, missing key material, bad
    /// ciphertext) reduces to `Ok(None)`: the vault never propagates an error
    /// for a per-tenant misconfiguration, it only logs and caches the
    /// negative result so the tenant is not re-queried every item.
    pub async fn get_provider_secret(
        &self,
        tenant_id: &str,
        provider_name: &str,
    ) -> Result<Option<Arc<str>>, BatchError> {
        let key = (tenant_id.to_string(), provider_name.to_string());
        if let Some(cached) = self.cache.read().await.get(&key) {
            return Ok(cached.clone());
        }

        let resolved = match self.resolve(tenant_id, provider_name).await {
            Ok(secret) => Some(secret),
            Err((failure, reason)) => {
                warn!(
                    tenant_id,
                    provider_name,
                    failure = failure.as_str(),
                    reason,
                    "credential vault: tenant unresolved — caching negative result"
                );
                None
            }
        };

        self.cache.write().await.insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn resolve(&self, tenant_id: &str, provider_name: &str) -> Result<Arc<str>, (VaultFailure, String)> {
        let record = self
            .store
            .find(tenant_id, provider_name)
            .await
            .map_err(|e| (VaultFailure::TenantUnconfigured, e.to_string()))?
            .ok_or((VaultFailure::TenantUnconfigured, "no credential record".to_string()))?;

        if let Some(ciphertext) = record.encrypted_secret.as_deref().filter(|s| !s.is_empty()) {
            return crypto::decrypt(&self.encryption_key, ciphertext)
                .map(Arc::from)
                .map_err(|e| (VaultFailure::Undecryptable, describe(e)));
        }

        // Fall back to a JSON configuration blob on the same record (key "secretKey").
        if let Some(json) = record.secret_key_json.as_deref() {
            let parsed: Value = serde_json::from_str(json)
                .map_err(|e| (VaultFailure::Undecryptable, format!("malformed secret_key_json: {e}")))?;
            if let Some(secret) = parsed.get("secretKey").and_then(Value::as_str) {
                return Ok(Arc::from(secret));
            }
        }

        Err((VaultFailure::KeyNotConfigured, "record has no encrypted_secret or secretKey fallback".to_string()))
    }
}

fn describe(e: CryptoError) -> String {
    e.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn test_key() -> [u8; 32] {
        [3u8; 32]
    }

    async fn vault_with(pool: sqlx::SqlitePool) -> CredentialVault {
        CredentialVault::new(test_key(), CredentialStore::new(pool))
    }

    #[tokio::test]
    async fn absent_tenant_caches_negative_result() {
        let storage = Storage::in_memory().await.unwrap();
        let vault = vault_with(storage.pool()).await;
        let secret = vault.get_provider_secret("missing-tenant", "STRIPE").await.unwrap();
        assert!(secret.is_none());
        // Second call hits the cache path, not the store — same result either way.
        let secret2 = vault.get_provider_secret("missing-tenant", "STRIPE").await.unwrap();
        assert!(secret2.is_none());
    }

    #[tokio::test]
    async fn decrypts_configured_secret() {
        let storage = Storage::in_memory().await.unwrap();
        let key = test_key();
        let ciphertext = crypto::encrypt(&key, "sk_live_abc").unwrap();
        sqlx::query(
            "INSERT INTO provider_credentials (tenant_id, provider_name, encrypted_secret) VALUES (?, ?, ?)",
        )
        .bind("t1")
        .bind("STRIPE")
        .bind(&ciphertext)
        .execute(&storage.pool())
        .await
        .unwrap();

        let vault = CredentialVault::new(key, CredentialStore::new(storage.pool()));
        let secret = vault.get_provider_secret("t1", "STRIPE").await.unwrap();
        assert_eq!(secret.as_deref(), Some("sk_live_abc"));
    }

    #[tokio::test]
    async fn clear_cache_forces_refetch() {
        let storage = Storage::in_memory().await.unwrap();
        let vault = vault_with(storage.pool()).await;
        vault.get_provider_secret("t1", "STRIPE").await.unwrap();
        vault.clear_cache().await;
        assert!(vault.cache.read().await.is_empty());
    }
}
