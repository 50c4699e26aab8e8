//! Payment provider REST surface. Hand-rolled
//! over `reqwest` rather than a Stripe SDK crate — Stripe SDK specifics are
//! explicitly out of scope; this client speaks just enough of the v1
//! REST API for the five read operations the workflows need.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::BatchError;

const API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub balance_transaction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeBalanceTransaction {
    pub id: String,
    /// Cents.
    pub fee: i64,
    /// Cents.
    pub net: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeTotalDetails {
    #[serde(default)]
    pub amount_tax: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub total_details: Option<StripeTotalDetails>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
    #[serde(rename = "type")]
    kind: String,
}

/// The five read operations the reconciler and fee/tax backfiller need
/// against a tenant-scoped secret key.
#[async_trait]
pub trait StripeClient: Send + Sync {
    async fn retrieve_subscription(
        &self,
        secret: &str,
        subscription_id: &str,
    ) -> Result<StripeSubscription, BatchError>;

    async fn retrieve_payment_intent(
        &self,
        secret: &str,
        payment_intent_id: &str,
    ) -> Result<StripePaymentIntent, BatchError>;

    async fn retrieve_charge(&self, secret: &str, charge_id: &str) -> Result<StripeCharge, BatchError>;

    async fn retrieve_balance_transaction(
        &self,
        secret: &str,
        balance_transaction_id: &str,
    ) -> Result<StripeBalanceTransaction, BatchError>;

    async fn retrieve_checkout_session(
        &self,
        secret: &str,
        checkout_session_id: &str,
    ) -> Result<StripeCheckoutSession, BatchError>;
}

pub struct HttpStripeClient {
    http: reqwest::Client,
}

impl HttpStripeClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builder should not fail with static config"),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, secret: &str, path: &str) -> Result<T, BatchError> {
        let resp = self
            .http
            .get(format!("{API_BASE}{path}"))
            .basic_auth(secret, Some(""))
            .send()
            .await
            .map_err(|e| BatchError::ProviderTransient(format!("stripe request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            resp.json::<T>()
                .await
                .map_err(|e| BatchError::ProviderPermanent(format!("stripe response decode failed: {e}")))
        } else {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .map(|e| format!("{}: {}", e.error.kind, e.error.message))
                .unwrap_or(body);
            if status.is_server_error() || status.as_u16() == 429 {
                Err(BatchError::ProviderTransient(format!("stripe {status}: {message}")))
            } else {
                Err(BatchError::ProviderPermanent(format!("stripe {status}: {message}")))
            }
        }
    }
}

impl Default for HttpStripeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StripeClient for HttpStripeClient {
    async fn retrieve_subscription(&self, secret: &str, subscription_id: &str) -> Result<StripeSubscription, BatchError> {
        self.get(secret, &format!("/subscriptions/{subscription_id}")).await
    }

    async fn retrieve_payment_intent(&self, secret: &str, payment_intent_id: &str) -> Result<StripePaymentIntent, BatchError> {
        self.get(secret, &format!("/payment_intents/{payment_intent_id}")).await
    }

    async fn retrieve_charge(&self, secret: &str, charge_id: &str) -> Result<StripeCharge, BatchError> {
        self.get(secret, &format!("/charges/{charge_id}")).await
    }

    async fn retrieve_balance_transaction(&self, secret: &str, balance_transaction_id: &str) -> Result<StripeBalanceTransaction, BatchError> {
        self.get(secret, &format!("/balance_transactions/{balance_transaction_id}")).await
    }

    async fn retrieve_checkout_session(&self, secret: &str, checkout_session_id: &str) -> Result<StripeCheckoutSession, BatchError> {
        self.get(secret, &format!("/checkout/sessions/{checkout_session_id}")).await
    }
}

/// Map a Stripe subscription status to the local enum.
pub fn map_subscription_status(stripe_status: &str) -> &'static str {
    match stripe_status {
        "active" => "ACTIVE",
        "trialing" => "TRIAL",
        "past_due" => "PAST_DUE",
        "canceled" | "cancelled" => "CANCELLED",
        "unpaid" => "SUSPENDED",
        "incomplete" | "incomplete_expired" => "EXPIRED",
        _ => "ACTIVE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_all_documented_stripe_statuses() {
        assert_eq!(map_subscription_status("active"), "ACTIVE");
        assert_eq!(map_subscription_status("trialing"), "TRIAL");
        assert_eq!(map_subscription_status("past_due"), "PAST_DUE");
        assert_eq!(map_subscription_status("canceled"), "CANCELLED");
        assert_eq!(map_subscription_status("cancelled"), "CANCELLED");
        assert_eq!(map_subscription_status("unpaid"), "SUSPENDED");
        assert_eq!(map_subscription_status("incomplete"), "EXPIRED");
        assert_eq!(map_subscription_status("incomplete_expired"), "EXPIRED");
        assert_eq!(map_subscription_status("anything_else"), "ACTIVE");
    }
}
