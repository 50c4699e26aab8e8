//! The four trigger endpoints: one per job type, plus health.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BatchError;
use crate::orchestrator::{self, TriggerRequest};
use crate::workflows::email_dispatcher::{EmailBatchParams, RecipientType};
use crate::workflows::fee_tax_backfiller::FeeTaxParams;
use crate::workflows::subscription_reconciler::SubscriptionRenewalParams;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "jobExecutionId", skip_serializing_if = "Option::is_none")]
    pub job_execution_id: Option<String>,
    #[serde(rename = "processedCount", skip_serializing_if = "Option::is_none")]
    pub processed_count: Option<i64>,
    #[serde(rename = "successCount", skip_serializing_if = "Option::is_none")]
    pub success_count: Option<i64>,
    #[serde(rename = "failedCount", skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<i64>,
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl TriggerResponse {
    fn accepted(job_execution_id: String) -> Self {
        Self {
            success: true,
            message: "accepted".to_string(),
            job_execution_id: Some(job_execution_id),
            processed_count: Some(0),
            success_count: Some(0),
            failed_count: Some(0),
            duration_ms: None,
        }
    }

    fn rejected(message: String) -> (axum::http::StatusCode, Json<Self>) {
        (
            axum::http::StatusCode::BAD_REQUEST,
            Json(Self {
                success: false,
                message,
                job_execution_id: None,
                processed_count: None,
                success_count: None,
                failed_count: None,
                duration_ms: None,
            }),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRenewalRequest {
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
    #[serde(rename = "maxSubscriptions")]
    pub max_subscriptions: Option<u32>,
    #[serde(rename = "stripeSubscriptionId")]
    pub stripe_subscription_id: Option<String>,
}

pub async fn trigger_subscription_renewal(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SubscriptionRenewalRequest>,
) -> (axum::http::StatusCode, Json<TriggerResponse>) {
    let request = TriggerRequest::SubscriptionRenewal(SubscriptionRenewalParams {
        tenant_id: body.tenant_id,
        max_subscriptions: body.max_subscriptions,
        stripe_subscription_id: body.stripe_subscription_id,
    });
    dispatch(ctx, request).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailBatchRequest {
    pub tenant_id: String,
    pub template_id: String,
    pub batch_size: Option<u32>,
    pub max_emails: Option<u32>,
    pub recipient_emails: Option<Vec<String>>,
    pub user_id: Option<String>,
    pub recipient_type: Option<String>,
    #[serde(default)]
    pub is_test_email: bool,
    pub subject_override: Option<String>,
    pub body_override: Option<String>,
}

pub async fn trigger_email_batch(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<EmailBatchRequest>,
) -> (axum::http::StatusCode, Json<TriggerResponse>) {
    let recipient_type = match body.recipient_type.as_deref() {
        Some("EVENT_ATTENDEES") => Some(RecipientType::EventAttendees),
        Some("SUBSCRIBED_MEMBERS") => Some(RecipientType::SubscribedMembers),
        Some(other) => return TriggerResponse::rejected(format!("unknown recipientType: {other}")),
        None => None,
    };

    let request = TriggerRequest::EmailBatch(EmailBatchParams {
        tenant_id: body.tenant_id,
        template_id: body.template_id,
        batch_size: body.batch_size,
        max_emails: body.max_emails,
        recipient_emails: body.recipient_emails,
        recipient_type,
        is_test_email: body.is_test_email,
        subject_override: body.subject_override,
        body_override: body.body_override,
        sent_by_id: body.user_id,
    });
    dispatch(ctx, request).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesTaxRequest {
    pub tenant_id: Option<String>,
    pub event_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub use_default_date_range: bool,
}

pub async fn trigger_fees_tax(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<FeesTaxRequest>,
) -> (axum::http::StatusCode, Json<TriggerResponse>) {
    let request = TriggerRequest::FeesTaxBackfill(FeeTaxParams {
        tenant_id: body.tenant_id,
        event_id: body.event_id,
        start_date: body.start_date,
        end_date: body.end_date,
        force_update: body.force_update,
        use_default_date_range: body.use_default_date_range,
    });
    dispatch(ctx, request).await
}

async fn dispatch(ctx: Arc<AppContext>, request: TriggerRequest) -> (axum::http::StatusCode, Json<TriggerResponse>) {
    match orchestrator::trigger(ctx, request, Some("http".to_string())).await {
        Ok(outcome) => (axum::http::StatusCode::ACCEPTED, Json(TriggerResponse::accepted(outcome.job_execution_id))),
        Err(BatchError::Validation(msg)) => TriggerResponse::rejected(msg),
        Err(e) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(TriggerResponse { success: false, message: e.to_string(), job_execution_id: None, processed_count: None, success_count: None, failed_count: None, duration_ms: None }),
        ),
    }
}

/// `GET /api/batch-jobs/{id}` — final counts for a completed or running job.
pub async fn get_job_execution(
    State(ctx): State<Arc<AppContext>>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Json<Value> {
    match ctx.ledger.get(&id).await {
        Ok(Some(row)) => Json(serde_json::json!({
            "success": true,
            "jobExecutionId": row.id,
            "status": row.status,
            "processedCount": row.processed,
            "successCount": row.success,
            "failedCount": row.failed,
            "skippedCount": row.skipped,
            "durationMs": row.duration_ms,
        })),
        Ok(None) => Json(serde_json::json!({ "success": false, "message": "not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "message": e.to_string() })),
    }
}
