//! Job Orchestrator — validates a trigger request, writes the ledger
//! row, and starts exactly one worker. Processing is asynchronous: `trigger`
//! returns as soon as the worker is scheduled.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::errors::BatchError;
use crate::storage::models::{JobStatus, JobType};
use crate::workflows::{email_dispatcher, email_dispatcher::EmailBatchParams, fee_tax_backfiller, fee_tax_backfiller::FeeTaxParams, subscription_reconciler, subscription_reconciler::SubscriptionRenewalParams};
use crate::AppContext;

#[derive(Debug, Clone)]
pub enum TriggerRequest {
    SubscriptionRenewal(SubscriptionRenewalParams),
    EmailBatch(EmailBatchParams),
    FeesTaxBackfill(FeeTaxParams),
}

impl TriggerRequest {
    fn job_type(&self) -> JobType {
        match self {
            TriggerRequest::SubscriptionRenewal(_) => JobType::SubscriptionRenewal,
            TriggerRequest::EmailBatch(p) if p.is_test_email => JobType::PromotionTestEmail,
            TriggerRequest::EmailBatch(_) => JobType::EmailBatch,
            TriggerRequest::FeesTaxBackfill(_) => JobType::FeesTaxBackfill,
        }
    }

    fn tenant_id(&self) -> Option<String> {
        match self {
            TriggerRequest::SubscriptionRenewal(p) => p.tenant_id.clone(),
            TriggerRequest::EmailBatch(p) => Some(p.tenant_id.clone()),
            TriggerRequest::FeesTaxBackfill(p) => p.tenant_id.clone(),
        }
    }

    /// Per-jobType request validation.
    fn validate(&self) -> Result<(), BatchError> {
        match self {
            TriggerRequest::EmailBatch(p) => {
                if p.tenant_id.is_empty() {
                    return Err(BatchError::Validation("tenantId is required for EMAIL_BATCH".to_string()));
                }
                if p.template_id.is_empty() {
                    return Err(BatchError::Validation("templateId is required for EMAIL_BATCH".to_string()));
                }
                Ok(())
            }
            TriggerRequest::SubscriptionRenewal(p) => {
                if p.stripe_subscription_id.is_some() && p.tenant_id.is_none() {
                    return Err(BatchError::Validation(
                        "tenantId is required when stripeSubscriptionId is set".to_string(),
                    ));
                }
                Ok(())
            }
            TriggerRequest::FeesTaxBackfill(_) => Ok(()),
        }
    }
}

pub struct TriggerOutcome {
    pub job_execution_id: String,
}

/// `trigger(jobType, requestBody) -> {accepted, jobExecutionId}`. Assigns a
/// UUID job correlation id, writes the RUNNING ledger row, and spawns exactly
/// one worker under the process's bounded pool. The same `(jobType,
/// tenantId)` may run concurrently — workflows are safe under that
/// assumption by construction (idempotency plus per-row updates).
pub async fn trigger(
    ctx: Arc<AppContext>,
    request: TriggerRequest,
    triggered_by: Option<String>,
) -> Result<TriggerOutcome, BatchError> {
    request.validate()?;

    let job_type = request.job_type();
    let tenant_id = request.tenant_id();
    let correlation_id = Uuid::new_v4().to_string();
    let job_name = format!("{}-{}", job_type.as_str().to_lowercase(), &correlation_id[..8]);

    let job_execution_id = ctx
        .ledger
        .create(&job_name, job_type, tenant_id.as_deref(), triggered_by.as_deref(), None)
        .await
        .map_err(BatchError::from)?;

    let permit_ctx = ctx.clone();
    let id_for_worker = job_execution_id.clone();

    tokio::spawn(async move {
        let semaphore = permit_ctx.worker_semaphore.clone();
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        run_worker(permit_ctx, id_for_worker, request).await;
    });

    Ok(TriggerOutcome { job_execution_id })
}

/// Runs one workflow to completion, honouring the configured overall
/// deadline. On elapse the worker abandons the in-flight workflow and
/// reports `Cancelled` rather than blocking past the deadline.
async fn run_workflow(
    ctx: &Arc<AppContext>,
    request: TriggerRequest,
) -> (JobStatus, i64, i64, i64, i64, Option<String>) {
    match request {
        TriggerRequest::SubscriptionRenewal(params) => {
            let counts = subscription_reconciler::run(ctx, params).await;
            (JobStatus::Completed, counts.processed, counts.success, counts.failed, counts.skipped, None)
        }
        TriggerRequest::EmailBatch(params) => match email_dispatcher::run(ctx, params).await {
            Ok(counts) => (JobStatus::Completed, counts.processed, counts.success, counts.failed, counts.skipped, None),
            Err(e) => (JobStatus::Failed, 0, 0, 0, 0, Some(e.to_string())),
        },
        TriggerRequest::FeesTaxBackfill(params) => {
            let aggregates = fee_tax_backfiller::run(ctx, params).await;
            let mut totals = crate::workflows::WorkflowCounts::default();
            for agg in &aggregates {
                totals.merge(agg.counts);
            }
            (JobStatus::Completed, totals.processed, totals.success, totals.failed, totals.skipped, None)
        }
    }
}

async fn run_worker(ctx: Arc<AppContext>, job_execution_id: String, request: TriggerRequest) {
    info!(job_execution_id, "worker starting");

    let (status, processed, success, failed, skipped, error_message) = match ctx.config.job_deadline_secs {
        Some(deadline_secs) => {
            match tokio::time::timeout(std::time::Duration::from_secs(deadline_secs), run_workflow(&ctx, request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let cancelled = BatchError::Cancelled("job deadline exceeded".to_string());
                    error!(job_execution_id, deadline_secs, error = %cancelled, "job exceeded its deadline — cancelling");
                    (JobStatus::Failed, 0, 0, 0, 0, Some("cancelled".to_string()))
                }
            }
        }
        None => run_workflow(&ctx, request).await,
    };

    ctx.metrics.record_job_completed(status == JobStatus::Failed || failed > 0);

    if let Err(e) = ctx
        .ledger
        .complete(&job_execution_id, status, processed, success, failed, skipped, error_message.as_deref())
        .await
    {
        error!(job_execution_id, error = %e, "failed to write ledger completion");
    }

    info!(job_execution_id, processed, success, failed, skipped, "worker finished");
}
