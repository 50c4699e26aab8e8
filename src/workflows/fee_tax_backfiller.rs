//! Fee/Tax Backfiller — reconciles local ticket-transaction records
//! against Stripe's authoritative fee, tax, and net-payout data.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{error, warn};

use crate::errors::BatchError;
use crate::AppContext;

use super::WorkflowCounts;

const SENTINEL_START: &str = "1970-01-01";
const SENTINEL_END: &str = "2099-12-31";

#[derive(Debug, Clone, Default)]
pub struct FeeTaxParams {
    pub tenant_id: Option<String>,
    pub event_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub force_update: bool,
    pub use_default_date_range: bool,
}

pub struct TenantAggregate {
    pub tenant_id: String,
    pub counts: WorkflowCounts,
    pub updated: i64,
    pub total_fees: Decimal,
    pub total_tax: Decimal,
}

fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Default window: `[first day of this month 00:00, today − 14 days 23:59:59.999999999]`.
pub fn default_window(today: NaiveDate) -> (String, String) {
    let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap();
    let end_date = today - ChronoDuration::days(14);
    let end = NaiveDateTime::new(end_date, NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap());
    (
        NaiveDateTime::new(start, NaiveTime::MIN).format("%Y-%m-%d %H:%M:%S%.9f").to_string(),
        end.format("%Y-%m-%d %H:%M:%S%.9f").to_string(),
    )
}

fn resolve_window(params: &FeeTaxParams) -> (String, String) {
    if params.use_default_date_range {
        return default_window(Utc::now().date_naive());
    }
    let start = params.start_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| SENTINEL_START.to_string());
    let end = params.end_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| SENTINEL_END.to_string());
    (start, end)
}

pub async fn run(ctx: &AppContext, params: FeeTaxParams) -> Vec<TenantAggregate> {
    // Drop any cached provider secrets before this run so a rotated secret
    // isn't served stale.
    ctx.vault.clear_cache().await;

    let (start, end) = resolve_window(&params);
    let mut aggregates = Vec::new();

    let tenants = match &params.tenant_id {
        Some(t) => vec![t.clone()],
        None => ctx.transactions.distinct_tenant_ids().await.unwrap_or_default(),
    };

    // All work for one tenant completes before moving to the next.
    for tenant_id in tenants {
        let mut aggregate = TenantAggregate {
            tenant_id: tenant_id.clone(),
            counts: WorkflowCounts::default(),
            updated: 0,
            total_fees: Decimal::ZERO,
            total_tax: Decimal::ZERO,
        };

        let mut page = 0i64;
        loop {
            let batch = match ctx
                .transactions
                .select_candidates(
                    Some(&tenant_id),
                    params.event_id.as_deref(),
                    &start,
                    &end,
                    params.force_update,
                    ctx.config.fee_batch_size as i64,
                    page,
                )
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(tenant_id, error = %e, "transaction selection failed");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len() as i64;

            for tx in batch {
                // Idempotency.
                let already_feed = tx
                    .stripe_fee_amount
                    .as_deref()
                    .and_then(|s| s.parse::<Decimal>().ok())
                    .is_some_and(|d| d > Decimal::ZERO);
                if !params.force_update && already_feed {
                    aggregate.counts.record_skip();
                    continue;
                }

                let Some(payment_intent_id) = tx.stripe_payment_intent_id.clone() else {
                    aggregate.counts.record_failure();
                    continue;
                };

                let secret = match ctx.vault.get_provider_secret(&tenant_id, "STRIPE").await {
                    Ok(Some(secret)) => secret,
                    Ok(None) => {
                        warn!(tenant_id, transaction_id = %tx.id, "no Stripe credential configured — skipping");
                        aggregate.counts.record_failure();
                        continue;
                    }
                    Err(e) => {
                        warn!(tenant_id, transaction_id = %tx.id, error = %e, "vault error");
                        aggregate.counts.record_failure();
                        continue;
                    }
                };

                match resolve_fee_tax_net(ctx, &secret, &tx.final_amount, tx.stripe_checkout_session_id.as_deref(), &payment_intent_id).await {
                    Ok((fee, tax, net)) => {
                        let reloaded = match ctx.transactions.reload(&tx.id).await {
                            Ok(Some(row)) => row,
                            Ok(None) => {
                                warn!(tenant_id, transaction_id = %tx.id, "transaction vanished before write");
                                aggregate.counts.record_failure();
                                continue;
                            }
                            Err(e) => {
                                warn!(tenant_id, transaction_id = %tx.id, error = %e, "reload failed");
                                aggregate.counts.record_failure();
                                continue;
                            }
                        };

                        // Another worker may have written a fee between selection and
                        // now; skip rather than overwrite unless this run forces it.
                        let reloaded_fee = reloaded
                            .stripe_fee_amount
                            .as_deref()
                            .and_then(|s| s.parse::<Decimal>().ok())
                            .is_some_and(|d| d > Decimal::ZERO);
                        if !params.force_update && reloaded_fee {
                            aggregate.counts.record_skip();
                            continue;
                        }

                        if let Err(e) = ctx
                            .transactions
                            .apply_fee_tax(&tx.id, &fee.to_string(), tax.map(|t| t.to_string()).as_deref(), &net.to_string())
                            .await
                        {
                            warn!(tenant_id, transaction_id = %tx.id, error = %e, "persistence error applying fee/tax");
                            aggregate.counts.record_failure();
                        } else {
                            aggregate.counts.record_success();
                            aggregate.updated += 1;
                            aggregate.total_fees += fee;
                            if let Some(t) = tax {
                                aggregate.total_tax += t;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(tenant_id, transaction_id = %tx.id, error = %e, "fee/tax resolution failed");
                        aggregate.counts.record_failure();
                    }
                }

                tokio::time::sleep(std::time::Duration::from_millis(ctx.config.rate_limit_delay_ms)).await;
            }

            if fetched < ctx.config.fee_batch_size as i64 {
                break;
            }
            page += 1;
        }

        if aggregate.counts.processed > 0 {
            let failure_rate = aggregate.counts.failed as f64 / aggregate.counts.processed as f64;
            if failure_rate > 0.10 {
                error!(tenant_id, failure_rate, "fee/tax backfill failure rate exceeds 10%");
            }
        }

        aggregates.push(aggregate);
    }

    aggregates
}

/// Charge → balance transaction for fee/net, checkout session or
/// payment-intent metadata for tax, computed net payout.
async fn resolve_fee_tax_net(
    ctx: &AppContext,
    secret: &str,
    final_amount: &str,
    checkout_session_id: Option<&str>,
    payment_intent_id: &str,
) -> Result<(Decimal, Option<Decimal>, Decimal), BatchError> {
    let payment_intent = ctx
        .governor
        .governed_call(crate::governor::Provider::Stripe, || async {
            ctx.stripe.retrieve_payment_intent(secret, payment_intent_id).await
        })
        .await?;
    ctx.metrics.record_stripe_call();

    let (fee, provider_net) = if let Some(charge_id) = payment_intent.latest_charge.clone() {
        let charge = ctx
            .governor
            .governed_call(crate::governor::Provider::Stripe, || async { ctx.stripe.retrieve_charge(secret, &charge_id).await })
            .await?;
        ctx.metrics.record_stripe_call();

        if let Some(bt_id) = charge.balance_transaction {
            let bt = ctx
                .governor
                .governed_call(crate::governor::Provider::Stripe, || async {
                    ctx.stripe.retrieve_balance_transaction(secret, &bt_id).await
                })
                .await?;
            ctx.metrics.record_stripe_call();
            (cents_to_decimal(bt.fee), Some(cents_to_decimal(bt.net)))
        } else {
            fallback_fee_only(&payment_intent.metadata)?
        }
    } else {
        fallback_fee_only(&payment_intent.metadata)?
    };

    let tax = resolve_tax(ctx, secret, checkout_session_id, &payment_intent.metadata).await;

    let final_amount_decimal: Decimal = final_amount
        .parse()
        .map_err(|_| BatchError::DataInconsistent(format!("unparseable final_amount: {final_amount}")))?;

    let net = provider_net.unwrap_or_else(|| {
        (final_amount_decimal - fee - tax.unwrap_or(Decimal::ZERO)).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    });

    Ok((fee.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero), tax, net))
}

/// A fallback path for when the PaymentIntent's latest charge (or its
/// balance transaction) cannot be retrieved: a `fallback_fee_cents` metadata
/// key, set by upstream reconciliation tooling for exactly this case.
fn fallback_fee_only(metadata: &std::collections::HashMap<String, String>) -> Result<(Decimal, Option<Decimal>), BatchError> {
    metadata
        .get("fallback_fee_cents")
        .and_then(|s| s.parse::<i64>().ok())
        .map(|cents| (cents_to_decimal(cents), None))
        .ok_or_else(|| BatchError::ProviderPermanent("no charge/balance-transaction and no fallback_fee_cents metadata".to_string()))
}

async fn resolve_tax(
    ctx: &AppContext,
    secret: &str,
    checkout_session_id: Option<&str>,
    metadata: &std::collections::HashMap<String, String>,
) -> Option<Decimal> {
    if let Some(session_id) = checkout_session_id {
        let result = ctx
            .governor
            .governed_call(crate::governor::Provider::Stripe, || async {
                ctx.stripe.retrieve_checkout_session(secret, session_id).await
            })
            .await;
        ctx.metrics.record_stripe_call();
        if let Ok(session) = result {
            if let Some(details) = session.total_details {
                return Some(cents_to_decimal(details.amount_tax));
            }
        }
    }

    if let Some(raw) = metadata.get("tax_amount") {
        match raw.parse::<Decimal>() {
            Ok(d) => return Some(d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)),
            Err(_) => warn!(raw, "tax_amount metadata is not a parseable decimal — treating as null"),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_matches_invariant_9() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let (start, end) = default_window(today);
        assert_eq!(start, "2025-03-01 00:00:00.000000000");
        assert_eq!(end, "2025-03-06 23:59:59.999999999");
    }

    #[test]
    fn cents_conversion_is_exact() {
        assert_eq!(cents_to_decimal(88).to_string(), "0.88");
        assert_eq!(cents_to_decimal(1912).to_string(), "19.12");
    }
}
