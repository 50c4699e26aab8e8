//! Public trigger API.
//!
//! Axum HTTP server, bound to `ctx.config.port`. Every POST accepts a job's
//! parameters and returns as soon as the job is scheduled — the workflow runs
//! in the background under the worker pool.
//!
//! Endpoints:
//!   POST /api/batch-jobs/subscription-renewal
//!   POST /api/batch-jobs/email
//!   POST /api/batch-jobs/stripe-fees-tax
//!   POST /api/batch-jobs/health
//!   GET  /api/batch-jobs/metrics
//!   GET  /api/batch-jobs/{id}

pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("0.0.0.0:{}", ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("trigger API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/batch-jobs/health", post(routes::health::health))
        .route("/api/batch-jobs/metrics", get(routes::metrics::get_metrics))
        .route(
            "/api/batch-jobs/subscription-renewal",
            post(routes::trigger::trigger_subscription_renewal),
        )
        .route("/api/batch-jobs/email", post(routes::trigger::trigger_email_batch))
        .route("/api/batch-jobs/stripe-fees-tax", post(routes::trigger::trigger_fees_tax))
        .route("/api/batch-jobs/{id}", get(routes::trigger::get_job_execution))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
