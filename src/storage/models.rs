//! Row types and domain enums for every entity in the data model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    SubscriptionRenewal,
    EmailBatch,
    FeesTaxBackfill,
    ContactFormEmail,
    PromotionTestEmail,
    ManualPaymentSummary,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SubscriptionRenewal => "SUBSCRIPTION_RENEWAL",
            JobType::EmailBatch => "EMAIL_BATCH",
            JobType::FeesTaxBackfill => "FEES_TAX_BACKFILL",
            JobType::ContactFormEmail => "CONTACT_FORM_EMAIL",
            JobType::PromotionTestEmail => "PROMOTION_TEST_EMAIL",
            JobType::ManualPaymentSummary => "MANUAL_PAYMENT_SUMMARY",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

/// One row of `job_executions` — the sole source of truth for "did this run occur?".
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobExecutionRow {
    pub id: String,
    pub job_name: String,
    pub job_type: String,
    pub tenant_id: Option<String>,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub processed: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
    pub error_message: Option<String>,
    pub triggered_by: Option<String>,
    pub parameters_json: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProviderCredentialRow {
    pub tenant_id: String,
    pub provider_name: String,
    pub encrypted_secret: Option<String>,
    pub encrypted_api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub use_case: Option<String>,
    pub fallback_order: i64,
    pub secret_key_json: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Trial,
    PastDue,
    Cancelled,
    Expired,
    Suspended,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Trial => "TRIAL",
            SubscriptionStatus::PastDue => "PAST_DUE",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::Expired => "EXPIRED",
            SubscriptionStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "TRIAL" => Some(Self::Trial),
            "PAST_DUE" => Some(Self::PastDue),
            "CANCELLED" => Some(Self::Cancelled),
            "EXPIRED" => Some(Self::Expired),
            "SUSPENDED" => Some(Self::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationStatus {
    Pending,
    Success,
    Failed,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Pending => "PENDING",
            ReconciliationStatus::Success => "SUCCESS",
            ReconciliationStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MembershipSubscriptionRow {
    pub id: String,
    pub tenant_id: String,
    pub user_profile_id: String,
    pub plan_id: String,
    pub status: String,
    pub current_period_start: String,
    pub current_period_end: String,
    pub cancel_at_period_end: bool,
    pub stripe_subscription_id: Option<String>,
    pub last_reconciliation_at: Option<String>,
    pub reconciliation_status: String,
    pub reconciliation_error: Option<String>,
}

impl MembershipSubscriptionRow {
    pub fn current_period_end_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.current_period_end, "%Y-%m-%d").ok()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventTicketTransactionRow {
    pub id: String,
    pub tenant_id: String,
    pub event_id: Option<String>,
    pub status: String,
    pub purchase_date: String,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_checkout_session_id: Option<String>,
    pub final_amount: String,
    pub stripe_fee_amount: Option<String>,
    pub stripe_amount_tax: Option<String>,
    pub net_payout_amount: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PromotionEmailTemplateRow {
    pub id: String,
    pub tenant_id: String,
    pub event_id: Option<String>,
    pub subject: String,
    pub from_email: String,
    pub body_html: String,
    pub header_image_url: Option<String>,
    pub footer_html: Option<String>,
    pub footer_image_url: Option<String>,
    pub promotion_code: Option<String>,
    pub discount_code_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailStatus {
    Sent,
    Failed,
    Bounced,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Sent => "SENT",
            EmailStatus::Failed => "FAILED",
            EmailStatus::Bounced => "BOUNCED",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantSettingsRow {
    pub tenant_id: String,
    pub email_header_image_url: Option<String>,
    pub email_footer_html_url: Option<String>,
    pub logo_image_url: Option<String>,
}

/// Only `Contact` is consumed by any implemented workflow; the rest round
/// out the enum for trigger-request validation against future job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantEmailType {
    Contact,
    Promotion,
    Receipt,
    Reminder,
    Welcome,
    PasswordReset,
    Invoice,
    Digest,
    Survey,
    Announcement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Success,
    Failed,
}

impl ReconciliationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Success => "SUCCESS",
            ReconciliationOutcome::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReconciliationLogRow {
    pub id: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub before_status: String,
    pub after_status: String,
    pub before_period_end: String,
    pub after_period_end: String,
    pub reconciled_at: String,
    pub outcome: String,
    pub detail: Option<String>,
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
