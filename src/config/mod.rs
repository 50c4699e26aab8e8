//! Configuration layer — CLI flag / env var / TOML file / built-in default,
//! in that priority order, following the teacher's `DaemonConfig` shape.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SUBSCRIPTION_BATCH_SIZE: u32 = 100;
const DEFAULT_EMAIL_BATCH_SIZE: u32 = 50;
const DEFAULT_MAX_EMAILS: u32 = 10_000;
const DEFAULT_FEE_BATCH_SIZE: u32 = 100;
const DEFAULT_RENEWAL_THRESHOLD_DAYS: u32 = 7;
const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 100;
const DEFAULT_EMAIL_RATE_PER_SEC: f64 = 200.0;
const DEFAULT_STRIPE_RATE_PER_SEC: f64 = 10.0;
const DEFAULT_WORKER_POOL_SIZE: usize = 8;
const DEFAULT_ASSET_READINESS_TIMEOUT_SECS: u64 = 10;

/// `{data_dir}/config.toml` — optional override layer beneath CLI/env.
#[derive(Deserialize, Default)]
struct TomlConfig {
    port: Option<u16>,
    log: Option<String>,
    subscription_batch_size: Option<u32>,
    email_batch_size: Option<u32>,
    max_emails: Option<u32>,
    fee_batch_size: Option<u32>,
    renewal_threshold_days: Option<u32>,
    extended_threshold_days: Option<u32>,
    rate_limit_delay_ms: Option<u64>,
    email_rate_per_sec: Option<f64>,
    stripe_rate_per_sec: Option<f64>,
    worker_pool_size: Option<usize>,
    job_deadline_secs: Option<u64>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

/// Everything a workflow or the trigger API needs to run, resolved once at
/// boot. Required fields missing at this point are a fatal
/// [`crate::errors::BatchError::Configuration`], not a per-item failure.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    pub database_dsn: String,

    /// Base64-encoded 256-bit AES key. Required — no default.
    pub payment_encryption_key: String,

    pub email_rate_per_sec: f64,
    pub stripe_rate_per_sec: f64,

    pub subscription_batch_size: u32,
    pub email_batch_size: u32,
    pub max_emails: u32,
    pub fee_batch_size: u32,

    /// Default look-ahead window for subscription renewal selection.
    pub renewal_threshold_days: u32,
    /// Required, no implicit default — every deployment must set an
    /// explicit extended re-check window.
    pub extended_threshold_days: u32,

    /// Sleep between Stripe calls in the fee/tax backfiller.
    pub rate_limit_delay_ms: u64,

    pub worker_pool_size: usize,
    /// Overall per-job deadline; `None` means no deadline is enforced.
    pub job_deadline_secs: Option<u64>,
    pub asset_readiness_timeout_secs: u64,
}

impl BatchConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        database_dsn: Option<String>,
        payment_encryption_key: Option<String>,
        extended_threshold_days: Option<u32>,
        job_deadline_secs: Option<u64>,
    ) -> Result<Self, crate::errors::BatchError> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let payment_encryption_key = payment_encryption_key
            .or_else(|| std::env::var("PAYMENT_ENCRYPTION_KEY").ok())
            .ok_or_else(|| {
                crate::errors::BatchError::Configuration(
                    "PAYMENT_ENCRYPTION_KEY is required and was not supplied".to_string(),
                )
            })?;

        let database_dsn = database_dsn
            .or_else(|| std::env::var("DATABASE_DSN").ok())
            .unwrap_or_else(|| format!("sqlite://{}/batchd.db?mode=rwc", data_dir.display()));

        let extended_threshold_days = extended_threshold_days
            .or(toml.extended_threshold_days)
            .ok_or_else(|| {
                crate::errors::BatchError::Configuration(
                    "extended_threshold_days is required: no implicit default".to_string(),
                )
            })?;

        Ok(Self {
            port: port.or(toml.port).unwrap_or(DEFAULT_PORT),
            log: log.or(toml.log).unwrap_or_else(|| "info".to_string()),
            database_dsn,
            payment_encryption_key,
            email_rate_per_sec: toml.email_rate_per_sec.unwrap_or(DEFAULT_EMAIL_RATE_PER_SEC),
            stripe_rate_per_sec: toml.stripe_rate_per_sec.unwrap_or(DEFAULT_STRIPE_RATE_PER_SEC),
            subscription_batch_size: toml.subscription_batch_size.unwrap_or(DEFAULT_SUBSCRIPTION_BATCH_SIZE),
            email_batch_size: toml.email_batch_size.unwrap_or(DEFAULT_EMAIL_BATCH_SIZE),
            max_emails: toml.max_emails.unwrap_or(DEFAULT_MAX_EMAILS),
            fee_batch_size: toml.fee_batch_size.unwrap_or(DEFAULT_FEE_BATCH_SIZE),
            renewal_threshold_days: toml.renewal_threshold_days.unwrap_or(DEFAULT_RENEWAL_THRESHOLD_DAYS),
            extended_threshold_days,
            rate_limit_delay_ms: toml.rate_limit_delay_ms.unwrap_or(DEFAULT_RATE_LIMIT_DELAY_MS),
            worker_pool_size: toml.worker_pool_size.unwrap_or(DEFAULT_WORKER_POOL_SIZE),
            job_deadline_secs: job_deadline_secs.or(toml.job_deadline_secs),
            asset_readiness_timeout_secs: DEFAULT_ASSET_READINESS_TIMEOUT_SECS,
            data_dir,
        })
    }
}

fn default_data_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("batchd");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join("batchd");
    }
    PathBuf::from(".batchd")
}
