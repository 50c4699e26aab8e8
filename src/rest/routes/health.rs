use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

/// `POST /api/batch-jobs/health` — returns the literal status string.
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Batch Jobs Service is running",
        "uptimeSecs": ctx.started_at.elapsed().as_secs(),
    }))
}
