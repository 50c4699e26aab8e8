//! End-to-end tests against a real trigger API server bound to a free port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tempfile::TempDir;

use batchd::config::BatchConfig;
use batchd::errors::BatchError;
use batchd::providers::email::{EmailSender, OutboundEmail};
use batchd::providers::object_store::ObjectStorageClient;
use batchd::providers::stripe::{StripeBalanceTransaction, StripeCharge, StripeCheckoutSession, StripeClient, StripePaymentIntent, StripeSubscription};
use batchd::storage::Storage;
use batchd::AppContext;

struct NoopStripeClient;

#[async_trait]
impl StripeClient for NoopStripeClient {
    async fn retrieve_subscription(&self, _secret: &str, _id: &str) -> Result<StripeSubscription, BatchError> {
        Err(BatchError::ProviderPermanent("no subscriptions in this test".into()))
    }
    async fn retrieve_payment_intent(&self, _secret: &str, _id: &str) -> Result<StripePaymentIntent, BatchError> {
        Err(BatchError::ProviderPermanent("no payment intents in this test".into()))
    }
    async fn retrieve_charge(&self, _secret: &str, _id: &str) -> Result<StripeCharge, BatchError> {
        Err(BatchError::ProviderPermanent("no charges in this test".into()))
    }
    async fn retrieve_balance_transaction(&self, _secret: &str, _id: &str) -> Result<StripeBalanceTransaction, BatchError> {
        Err(BatchError::ProviderPermanent("no balance transactions in this test".into()))
    }
    async fn retrieve_checkout_session(&self, _secret: &str, _id: &str) -> Result<StripeCheckoutSession, BatchError> {
        Err(BatchError::ProviderPermanent("no checkout sessions in this test".into()))
    }
}

struct RecordingEmailSender {
    sent: std::sync::Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, email: OutboundEmail<'_>) -> Result<(), BatchError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.sent.lock().unwrap().push(email.to.to_string());
        Ok(())
    }
}

struct EmptyObjectStore;

#[async_trait]
impl ObjectStorageClient for EmptyObjectStore {
    async fn get_text(&self, _url: &str) -> Result<String, BatchError> {
        Ok(String::new())
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn start_test_server(dir: &TempDir, recorder: Arc<RecordingEmailSender>) -> (String, Arc<AppContext>) {
    let port = free_port();
    let config = Arc::new(
        BatchConfig::new(
            Some(port),
            Some(dir.path().to_path_buf()),
            Some("error".to_string()),
            None,
            Some(STANDARD.encode([0u8; 32])),
            Some(30),
            None,
        )
        .unwrap(),
    );

    let storage = Arc::new(Storage::new(&dir.path().join("data")).await.unwrap());
    let ctx = Arc::new(
        AppContext::new(
            config.clone(),
            storage,
            Arc::new(NoopStripeClient),
            recorder,
            Arc::new(EmptyObjectStore),
        )
        .unwrap(),
    );

    let ctx_server = ctx.clone();
    tokio::spawn(async move {
        let router = batchd::rest::build_router(ctx_server);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        axum::serve(listener, router).await.ok();
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    (format!("http://127.0.0.1:{port}"), ctx)
}

#[tokio::test]
async fn health_endpoint_reports_running() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingEmailSender { sent: std::sync::Mutex::new(Vec::new()), attempts: AtomicUsize::new(0) });
    let (base_url, _ctx) = start_test_server(&dir, recorder).await;

    let resp = reqwest::Client::new().post(format!("{base_url}/api/batch-jobs/health")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Batch Jobs Service is running");
}

#[tokio::test]
async fn email_batch_trigger_rejects_missing_template() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingEmailSender { sent: std::sync::Mutex::new(Vec::new()), attempts: AtomicUsize::new(0) });
    let (base_url, _ctx) = start_test_server(&dir, recorder).await;

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/api/batch-jobs/email"))
        .json(&json!({"tenantId": "t1", "templateId": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn email_batch_trigger_dispatches_to_recipient_list() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingEmailSender { sent: std::sync::Mutex::new(Vec::new()), attempts: AtomicUsize::new(0) });
    let (base_url, ctx) = start_test_server(&dir, recorder.clone()).await;

    sqlx::query(
        "INSERT INTO promotion_email_templates (id, tenant_id, subject, from_email, body_html) VALUES ('tpl1', 't1', 'Hello', 'noreply@t1.test', '<p>hi</p>')",
    )
    .execute(&ctx.storage.pool())
    .await
    .unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/api/batch-jobs/email"))
        .json(&json!({
            "tenantId": "t1",
            "templateId": "tpl1",
            "recipientEmails": ["a@x.test", "b@x.test"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
    let body: Value = resp.json().await.unwrap();
    let job_id = body["jobExecutionId"].as_str().unwrap().to_string();

    // The worker runs asynchronously — poll for completion.
    let mut completed = None;
    for _ in 0..50 {
        let row = ctx.ledger.get(&job_id).await.unwrap();
        if let Some(row) = row {
            if row.status == "COMPLETED" {
                completed = Some(row);
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let row = completed.expect("job did not complete in time");
    assert_eq!(row.success, 2);
    assert_eq!(recorder.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn subscription_renewal_trigger_requires_tenant_id_with_explicit_subscription() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingEmailSender { sent: std::sync::Mutex::new(Vec::new()), attempts: AtomicUsize::new(0) });
    let (base_url, _ctx) = start_test_server(&dir, recorder).await;

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/api/batch-jobs/subscription-renewal"))
        .json(&json!({"stripeSubscriptionId": "sub_123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fees_tax_trigger_skips_already_feed_transactions_without_force() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingEmailSender { sent: std::sync::Mutex::new(Vec::new()), attempts: AtomicUsize::new(0) });
    let (base_url, ctx) = start_test_server(&dir, recorder).await;

    sqlx::query(
        "INSERT INTO event_ticket_transactions
            (id, tenant_id, status, purchase_date, stripe_payment_intent_id, final_amount, stripe_fee_amount, net_payout_amount)
         VALUES ('tx1', 't1', 'COMPLETED', '2026-07-01', 'pi_1', '20.00', '0.88', '19.12')",
    )
    .execute(&ctx.storage.pool())
    .await
    .unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/api/batch-jobs/stripe-fees-tax"))
        .json(&json!({
            "tenantId": "t1",
            "startDate": "2026-07-01",
            "endDate": "2026-07-31",
            "forceUpdate": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
    let body: Value = resp.json().await.unwrap();
    let job_id = body["jobExecutionId"].as_str().unwrap().to_string();

    let mut completed = None;
    for _ in 0..50 {
        let row = ctx.ledger.get(&job_id).await.unwrap();
        if let Some(row) = row {
            if row.status == "COMPLETED" {
                completed = Some(row);
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    // The only candidate row already has a fee recorded, so the backfiller
    // should skip it without ever calling the (failing) Stripe client.
    let row = completed.expect("job did not complete in time");
    assert_eq!(row.success, 0);
    assert_eq!(row.failed, 0);
}

#[tokio::test]
async fn job_execution_status_is_queryable_after_completion() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingEmailSender { sent: std::sync::Mutex::new(Vec::new()), attempts: AtomicUsize::new(0) });
    let (base_url, _ctx) = start_test_server(&dir, recorder).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/api/batch-jobs/subscription-renewal"))
        .json(&json!({"tenantId": "t1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
    let body: Value = resp.json().await.unwrap();
    let job_id = body["jobExecutionId"].as_str().unwrap().to_string();

    // Give the worker a moment, then poll the by-id lookup route.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let resp = client.get(format!("{base_url}/api/batch-jobs/{job_id}")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["jobExecutionId"], job_id);
}
