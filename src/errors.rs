//! Error taxonomy shared by every workflow engine.
//!
//! All per-item errors reduce to "continue the batch, count as failed (or
//! skipped)". Only [`BatchError::Configuration`] is fatal enough to abort a
//! process at boot; everything else is caught at the item boundary inside a
//! workflow and recorded on the relevant audit table.

use thiserror::Error;

/// Error kinds a workflow can encounter processing a single tenant or row.
///
/// `Display` messages are safe to log: no variant carries decrypted secret
/// material.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Fatal at boot — missing encryption key, unreachable database.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tenant-scoped misconfiguration (no credential, bad secret). Logged,
    /// counted, never aborts the batch.
    #[error("tenant {tenant_id} misconfigured for {provider}: {reason}")]
    TenantMisconfigured {
        tenant_id: String,
        provider: String,
        reason: String,
    },

    /// Network failure, 5xx, or provider-side rate limiting. The circuit
    /// breaker may open in response.
    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    /// 4xx with a non-retryable reason. Not retried within the run.
    #[error("provider permanent error: {0}")]
    ProviderPermanent(String),

    /// An expected row or entity was missing.
    #[error("not found: {0}")]
    DataNotFound(String),

    /// A repository invariant was violated (e.g. a unique lookup returned
    /// more than one row).
    #[error("data inconsistent: {0}")]
    DataInconsistent(String),

    /// Bad trigger request — rejected before any work starts.
    #[error("validation error: {0}")]
    Validation(String),

    /// The job's deadline elapsed or the worker was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Provider call short-circuited because its circuit breaker is open.
    #[error("provider unavailable (circuit open): {0}")]
    ProviderUnavailable(String),

    /// Storage-layer failure not otherwise classified.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl BatchError {
    /// `true` for kinds that should increment a per-item `failed` counter.
    pub fn counts_as_failed(&self) -> bool {
        !matches!(self, BatchError::Cancelled(_) | BatchError::Validation(_))
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
