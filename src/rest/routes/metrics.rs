use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

/// `GET /api/batch-jobs/metrics` — process counters and circuit states.
pub async fn get_metrics(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let snapshot = ctx.metrics.snapshot(&ctx.governor).await;
    Json(json!({
        "jobsRun": snapshot.jobs_run,
        "jobsFailed": snapshot.jobs_failed,
        "stripeCalls": snapshot.stripe_calls,
        "emailSends": snapshot.email_sends,
        "stripeCircuitState": snapshot.stripe_circuit_state.to_string(),
        "emailCircuitState": snapshot.email_circuit_state.to_string(),
    }))
}
