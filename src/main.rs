use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;

use batchd::config::BatchConfig;
use batchd::providers::email::SesEmailSender;
use batchd::providers::object_store::HttpObjectStorageClient;
use batchd::providers::stripe::HttpStripeClient;
use batchd::rest::start_rest_server;
use batchd::storage::Storage;
use batchd::AppContext;

#[derive(Parser)]
#[command(name = "batchd", about = "Batch Jobs Service — subscription renewal, bulk email, fee/tax backfill", version)]
struct Args {
    /// Trigger API port
    #[arg(long, env = "BATCHD_PORT")]
    port: Option<u16>,

    /// Data directory for the SQLite database and config.toml
    #[arg(long, env = "BATCHD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BATCHD_LOG")]
    log: Option<String>,

    /// Database DSN override (defaults to `{data_dir}/batchd.db`)
    #[arg(long, env = "DATABASE_DSN")]
    database_dsn: Option<String>,

    /// Base64-encoded 256-bit AES key used to decrypt provider credentials
    #[arg(long, env = "PAYMENT_ENCRYPTION_KEY")]
    payment_encryption_key: Option<String>,

    /// Widened re-check window (days) for subscriptions Stripe may have already rolled
    #[arg(long, env = "BATCHD_EXTENDED_THRESHOLD_DAYS")]
    extended_threshold_days: Option<u32>,

    /// Overall per-job deadline in seconds (unset = no deadline enforced)
    #[arg(long, env = "BATCHD_JOB_DEADLINE_SECS")]
    job_deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(&log_level).compact().init();

    let config = Arc::new(
        BatchConfig::new(
            args.port,
            args.data_dir,
            args.log,
            args.database_dsn,
            args.payment_encryption_key,
            args.extended_threshold_days,
            args.job_deadline_secs,
        )
        .context("failed to resolve configuration")?,
    );

    info!(port = config.port, data_dir = %config.data_dir.display(), "starting Batch Jobs Service");

    let storage = Arc::new(Storage::new(&config.data_dir).await.context("failed to open storage")?);

    let stripe = Arc::new(HttpStripeClient::new());
    let email_sender = Arc::new(SesEmailSender::from_env().await);
    let object_store = Arc::new(HttpObjectStorageClient::new());

    let ctx = Arc::new(AppContext::new(config, storage, stripe, email_sender, object_store)?);

    start_rest_server(ctx).await
}
