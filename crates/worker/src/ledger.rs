//! Webhook ledger maintenance
//!
//! Finished ledger rows only matter for deduplicating provider retries, which
//! stop after a few days. Rows stuck in `processing` mean a handler died
//! mid-event; the next delivery reclaims them, but they are worth surfacing.

use practice_billing::{BillingResult, SubscriptionStore};
use tracing::{info, warn};

/// Default retention for finished ledger rows
pub const DEFAULT_RETENTION_DAYS: i32 = 30;

/// Retention window from `WEBHOOK_EVENT_RETENTION_DAYS`
pub fn retention_days_from_env() -> i32 {
    match std::env::var("WEBHOOK_EVENT_RETENTION_DAYS") {
        Ok(v) => match v.parse::<i32>() {
            Ok(days) if days > 0 => days,
            _ => {
                warn!(value = %v, "Invalid WEBHOOK_EVENT_RETENTION_DAYS, using default");
                DEFAULT_RETENTION_DAYS
            }
        },
        Err(_) => DEFAULT_RETENTION_DAYS,
    }
}

/// Delete finished ledger rows older than the retention window
pub async fn prune_ledger(
    store: &dyn SubscriptionStore,
    retention_days: i32,
) -> BillingResult<u64> {
    let deleted = store.prune_events(retention_days).await?;
    if deleted > 0 {
        info!(deleted = deleted, retention_days = retention_days, "Pruned webhook ledger");
    }
    Ok(deleted)
}

/// Count rows stuck in `processing` and warn when there are any
pub async fn check_stuck_events(store: &dyn SubscriptionStore) -> BillingResult<i64> {
    let stuck = store.count_stuck_events().await?;
    if stuck > 0 {
        warn!(stuck = stuck, "Webhook events stuck in processing");
    }
    Ok(stuck)
}
