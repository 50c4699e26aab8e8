//! Subscription Reconciler — reconciles membership subscriptions
//! coming up for renewal against Stripe's canonical status and period.

use chrono::{Duration as ChronoDuration, Utc};
use tracing::warn;

use crate::providers::stripe::map_subscription_status;
use crate::storage::models::{now_rfc3339, ReconciliationOutcome};
use crate::AppContext;

use super::WorkflowCounts;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionRenewalParams {
    pub tenant_id: Option<String>,
    pub max_subscriptions: Option<u32>,
    pub stripe_subscription_id: Option<String>,
}

pub async fn run(ctx: &AppContext, params: SubscriptionRenewalParams) -> WorkflowCounts {
    let mut totals = WorkflowCounts::default();

    let tenants = match &params.tenant_id {
        Some(t) => vec![t.clone()],
        None => ctx.subscriptions.distinct_tenant_ids().await.unwrap_or_default(),
    };

    let renewal_threshold = (Utc::now() + ChronoDuration::days(ctx.config.renewal_threshold_days as i64)).date_naive();
    let extended_threshold = (Utc::now() + ChronoDuration::days(ctx.config.extended_threshold_days as i64)).date_naive();

    // Tenants processed sequentially; within a tenant, subscriptions one at a time.
    for tenant_id in tenants {
        let candidates = if let Some(stripe_id) = &params.stripe_subscription_id {
            match ctx.subscriptions.find_by_stripe_id(&tenant_id, stripe_id).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(tenant_id, error = %e, "subscription lookup failed");
                    totals.record_failure();
                    continue;
                }
            }
        } else {
            match ctx
                .subscriptions
                .select_candidates(&tenant_id, renewal_threshold, extended_threshold)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(tenant_id, error = %e, "candidate selection failed");
                    continue;
                }
            }
        };

        // A single-subscription lookup returning more than one row is a
        // data-inconsistency, not a normal per-item outcome.
        if params.stripe_subscription_id.is_some() && candidates.len() > 1 {
            warn!(tenant_id, count = candidates.len(), "single-subscription lookup returned multiple rows");
            totals.record_failure();
            continue;
        }

        let limited: Vec<_> = match params.max_subscriptions {
            Some(max) => candidates.into_iter().take(max as usize).collect(),
            None => candidates,
        };

        for sub in limited {
            let secret = match ctx.vault.get_provider_secret(&tenant_id, "STRIPE").await {
                Ok(Some(secret)) => secret,
                Ok(None) => {
                    warn!(tenant_id, subscription_id = %sub.id, "no Stripe credential configured — skipping");
                    totals.record_failure();
                    continue;
                }
                Err(e) => {
                    warn!(tenant_id, subscription_id = %sub.id, error = %e, "vault error");
                    totals.record_failure();
                    continue;
                }
            };

            let Some(stripe_sub_id) = sub.stripe_subscription_id.clone() else {
                warn!(tenant_id, subscription_id = %sub.id, "candidate has no stripe_subscription_id");
                totals.record_failure();
                continue;
            };

            let reconciled_at = now_rfc3339();
            let before_status = sub.status.clone();
            let before_period_end = sub.current_period_end.clone();

            let outcome = ctx
                .governor
                .governed_call(crate::governor::Provider::Stripe, || async {
                    ctx.stripe.retrieve_subscription(&secret, &stripe_sub_id).await
                })
                .await;
            ctx.metrics.record_stripe_call();

            match outcome {
                Ok(remote) => {
                    let after_status = map_subscription_status(&remote.status).to_string();
                    let period_start = chrono::DateTime::from_timestamp(remote.current_period_start, 0)
                        .map(|d| d.date_naive())
                        .unwrap_or_else(|| sub.current_period_end_date().unwrap_or_default());
                    let period_end = chrono::DateTime::from_timestamp(remote.current_period_end, 0)
                        .map(|d| d.date_naive())
                        .unwrap_or_else(|| sub.current_period_end_date().unwrap_or_default());

                    if let Err(e) = ctx
                        .subscriptions
                        .apply_reconciliation(
                            &sub.id,
                            &after_status,
                            period_start,
                            period_end,
                            remote.cancel_at_period_end,
                            &reconciled_at,
                            "SUCCESS",
                            None,
                        )
                        .await
                    {
                        warn!(tenant_id, subscription_id = %sub.id, error = %e, "persistence error applying reconciliation");
                        totals.record_failure();
                        let _ = ctx
                            .reconciliation_log
                            .append(
                                &tenant_id,
                                &sub.id,
                                &before_status,
                                &after_status,
                                &before_period_end,
                                &period_end.format("%Y-%m-%d").to_string(),
                                ReconciliationOutcome::Failed,
                                Some(&e.to_string()),
                            )
                            .await;
                    } else {
                        totals.record_success();
                        let _ = ctx
                            .reconciliation_log
                            .append(
                                &tenant_id,
                                &sub.id,
                                &before_status,
                                &after_status,
                                &before_period_end,
                                &period_end.format("%Y-%m-%d").to_string(),
                                ReconciliationOutcome::Success,
                                None,
                            )
                            .await;
                    }
                }
                Err(e) => {
                    totals.record_failure();
                    let _ = ctx.subscriptions.mark_failed(&sub.id, &reconciled_at, &e.to_string()).await;
                    let _ = ctx
                        .reconciliation_log
                        .append(
                            &tenant_id,
                            &sub.id,
                            &before_status,
                            &before_status,
                            &before_period_end,
                            &before_period_end,
                            ReconciliationOutcome::Failed,
                            Some(&e.to_string()),
                        )
                        .await;
                }
            }

            tokio::time::sleep(std::time::Duration::from_millis(ctx.config.rate_limit_delay_ms)).await;
        }
    }

    totals
}
