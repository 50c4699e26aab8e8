//! Email Dispatcher — bulk transactional email send driven by a
//! per-tenant template and rate-governed dispatch.

use tracing::{error, warn};

use crate::content::build_email_content;
use crate::errors::BatchError;
use crate::providers::email::OutboundEmail;
use crate::storage::models::EmailStatus;
use crate::AppContext;

use super::WorkflowCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    EventAttendees,
    SubscribedMembers,
}

#[derive(Debug, Clone)]
pub struct EmailBatchParams {
    pub tenant_id: String,
    pub template_id: String,
    pub batch_size: Option<u32>,
    pub max_emails: Option<u32>,
    pub recipient_emails: Option<Vec<String>>,
    pub recipient_type: Option<RecipientType>,
    pub is_test_email: bool,
    pub subject_override: Option<String>,
    pub body_override: Option<String>,
    pub sent_by_id: Option<String>,
}

pub async fn run(ctx: &AppContext, params: EmailBatchParams) -> Result<WorkflowCounts, BatchError> {
    let mut totals = WorkflowCounts::default();

    let template = ctx
        .templates
        .find(&params.template_id, &params.tenant_id)
        .await
        .map_err(BatchError::from)?
        .ok_or_else(|| BatchError::DataNotFound(format!("template {} not found for tenant {}", params.template_id, params.tenant_id)))?;

    let tenant_settings = ctx.tenant_settings.find(&params.tenant_id).await.map_err(BatchError::from)?;

    // Pre-warm header/footer assets with a time-boxed readiness check;
    // proceed even on timeout — content building degrades gracefully.
    let readiness_deadline = std::time::Duration::from_secs(ctx.config.asset_readiness_timeout_secs);
    if let Some(footer_url) = tenant_settings.as_ref().and_then(|t| t.email_footer_html_url.clone()) {
        let tenant_id = params.tenant_id.clone();
        let logo = tenant_settings.as_ref().and_then(|t| t.logo_image_url.clone());
        let fetcher = &ctx.asset_fetcher;
        if tokio::time::timeout(readiness_deadline, fetcher.fetch_footer_html(&tenant_id, &footer_url, logo.as_deref(), true))
            .await
            .is_err()
        {
            warn!(tenant_id = %params.tenant_id, "asset pre-warm timed out — continuing");
        }
    }

    let recipient_type = params.recipient_type.or_else(|| {
        if template.event_id.is_some() {
            Some(RecipientType::EventAttendees)
        } else {
            Some(RecipientType::SubscribedMembers)
        }
    });

    let mut recipients = if let Some(explicit) = &params.recipient_emails {
        explicit.clone()
    } else {
        match recipient_type {
            Some(RecipientType::EventAttendees) => {
                let event_id = template.event_id.clone().unwrap_or_default();
                ctx.recipients.event_attendees(&params.tenant_id, &event_id).await.map_err(BatchError::from)?
            }
            Some(RecipientType::SubscribedMembers) | None => {
                ctx.recipients.subscribed_members(&params.tenant_id).await.map_err(BatchError::from)?
            }
        }
    };

    let max_emails = params.max_emails.unwrap_or(ctx.config.max_emails) as usize;
    if recipients.len() > max_emails {
        warn!(tenant_id = %params.tenant_id, total = recipients.len(), max_emails, "capping recipient list");
        recipients.truncate(max_emails);
    }

    let built = build_email_content(&ctx.asset_fetcher, &template, tenant_settings.as_ref(), params.subject_override.as_deref(), params.body_override.as_deref(), false).await;

    let batch_size = params.batch_size.unwrap_or(ctx.config.email_batch_size).max(1) as usize;

    for chunk in recipients.chunks(batch_size) {
        for recipient in chunk {
            let send_result = ctx
                .governor
                .governed_call(crate::governor::Provider::Email, || async {
                    ctx.email_sender
                        .send(OutboundEmail {
                            to: recipient,
                            from: &template.from_email,
                            reply_to: None,
                            subject: &built.subject,
                            body_html: &built.body_html,
                        })
                        .await
                })
                .await;
            ctx.metrics.record_email_send();

            let (status, error_message) = match &send_result {
                Ok(()) => {
                    totals.record_success();
                    (EmailStatus::Sent, None)
                }
                Err(e) => {
                    totals.record_failure();
                    (EmailStatus::Failed, Some(e.to_string()))
                }
            };

            if let Err(e) = ctx
                .templates
                .append_sent_log(
                    &params.tenant_id,
                    Some(&template.id),
                    template.event_id.as_deref(),
                    recipient,
                    &built.subject,
                    params.is_test_email,
                    status,
                    error_message.as_deref(),
                    params.sent_by_id.as_deref(),
                )
                .await
            {
                error!(tenant_id = %params.tenant_id, recipient, error = %e, "failed to append sent-log row");
            }
        }
    }

    Ok(totals)
}
