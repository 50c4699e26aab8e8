pub mod assets;
pub mod config;
pub mod content;
pub mod crypto;
pub mod errors;
pub mod governor;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod rest;
pub mod retry;
pub mod storage;
pub mod vault;
pub mod workflows;

use std::sync::Arc;

use config::BatchConfig;
use governor::SharedRateGovernor;
use metrics::Metrics;
use providers::email::EmailSender;
use providers::stripe::StripeClient;
use storage::{
    credential_store::CredentialStore, ledger_store::LedgerStore, recipient_store::RecipientStore,
    reconciliation_store::ReconciliationStore, subscription_store::SubscriptionStore, template_store::TemplateStore,
    tenant_settings_store::TenantSettingsStore, transaction_store::TransactionStore, Storage,
};
use vault::CredentialVault;

/// Shared application state passed to every workflow and trigger handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<BatchConfig>,
    pub storage: Arc<Storage>,

    pub ledger: LedgerStore,
    pub subscriptions: SubscriptionStore,
    pub transactions: TransactionStore,
    pub templates: TemplateStore,
    pub tenant_settings: TenantSettingsStore,
    pub recipients: RecipientStore,
    pub reconciliation_log: ReconciliationStore,

    pub vault: Arc<CredentialVault>,
    pub governor: SharedRateGovernor,
    pub asset_fetcher: Arc<assets::AssetFetcher>,

    pub stripe: Arc<dyn StripeClient>,
    pub email_sender: Arc<dyn EmailSender>,

    pub metrics: Arc<Metrics>,
    pub worker_semaphore: Arc<tokio::sync::Semaphore>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Build the stores layer (and everything else a caller cannot reasonably
    /// construct by hand) from the storage pool and the already-built
    /// provider clients. Kept separate from `main`'s wiring so tests can
    /// build a full `AppContext` against an in-memory database.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<BatchConfig>,
        storage: Arc<Storage>,
        stripe: Arc<dyn StripeClient>,
        email_sender: Arc<dyn EmailSender>,
        object_store: Arc<dyn providers::object_store::ObjectStorageClient>,
    ) -> Result<Self, errors::BatchError> {
        let pool = storage.pool();
        let key = crypto::sanitize_and_decode_key(&config.payment_encryption_key)
            .map_err(|e| errors::BatchError::Configuration(format!("payment_encryption_key: {e}")))?;

        let vault = Arc::new(CredentialVault::new(key, CredentialStore::new(pool.clone())));
        let governor: SharedRateGovernor =
            Arc::new(governor::RateGovernor::new(config.email_rate_per_sec, config.stripe_rate_per_sec));
        let asset_fetcher = Arc::new(assets::AssetFetcher::new(object_store));

        Ok(Self {
            ledger: LedgerStore::new(pool.clone()),
            subscriptions: SubscriptionStore::new(pool.clone()),
            transactions: TransactionStore::new(pool.clone()),
            templates: TemplateStore::new(pool.clone()),
            tenant_settings: TenantSettingsStore::new(pool.clone()),
            recipients: RecipientStore::new(pool.clone()),
            reconciliation_log: ReconciliationStore::new(pool),
            vault,
            governor,
            asset_fetcher,
            stripe,
            email_sender,
            metrics: Arc::new(Metrics::default()),
            worker_semaphore: Arc::new(tokio::sync::Semaphore::new(config.worker_pool_size)),
            started_at: std::time::Instant::now(),
            storage,
            config,
        })
    }
}
