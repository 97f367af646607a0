#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Practice Background Worker
//!
//! Scheduled maintenance of the Stripe webhook ledger:
//! - Prune finished ledger rows (daily at 03:30 UTC)
//! - Warn about events stuck in processing (every 15 minutes)

mod ledger;

use std::sync::Arc;

use practice_billing::{PgSubscriptionStore, SubscriptionStore};
use practice_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Practice Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url, 2).await?;
    info!("Database pool created");

    let store: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(pool));
    let retention_days = ledger::retention_days_from_env();

    let scheduler = JobScheduler::new().await?;

    // Job 1: Prune finished webhook ledger rows
    // Cron: At 03:30 every day
    let prune_store = store.clone();
    scheduler
        .add(Job::new_async("0 30 3 * * *", move |_uuid, _l| {
            let store = prune_store.clone();
            Box::pin(async move {
                info!("Running webhook ledger cleanup");
                if let Err(e) = ledger::prune_ledger(store.as_ref(), retention_days).await {
                    error!(error = %e, "Webhook ledger cleanup failed");
                }
            })
        })?)
        .await?;
    info!(
        retention_days = retention_days,
        "Scheduled: Webhook ledger cleanup (daily at 03:30 UTC)"
    );

    // Job 2: Surface events stuck in processing
    let stuck_store = store.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let store = stuck_store.clone();
            Box::pin(async move {
                if let Err(e) = ledger::check_stuck_events(store.as_ref()).await {
                    error!(error = %e, "Stuck webhook check failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Stuck webhook check (every 15 minutes)");

    scheduler.start().await?;
    info!("Worker scheduler started");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down worker");

    Ok(())
}
