//! Practice API Server
//!
//! Serves the billing endpoints used by the practice dashboard and
//! receives Stripe webhooks.

use std::{net::SocketAddr, sync::Arc};

use practice_api::{config::Config, routes::create_router, state::AppState};
use practice_billing::{BillingService, PgSubscriptionStore, StripeClient, SubscriptionStore};
use practice_shared::{create_migration_pool, create_pool};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,practice_api=debug,practice_billing=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_json);

    tracing::info!("Starting Practice API Server v{}", env!("CARGO_PKG_VERSION"));

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database connection established");

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        let migration_pool = create_migration_pool(&config.database_url).await?;
        practice_shared::run_migrations(&migration_pool).await?;
        migration_pool.close().await;
        tracing::info!("Database migrations applied");
    }

    let store: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(pool));

    let billing = if config.enable_billing {
        let stripe = StripeClient::from_env()?;
        if stripe.config().webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set - webhooks will be rejected");
        }
        tracing::info!("Stripe billing enabled");
        Some(Arc::new(BillingService::with_stripe(stripe, store.clone())))
    } else {
        tracing::warn!("Billing disabled - billing routes will return 503");
        None
    };

    let state = AppState::new(config.clone(), store, billing);

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
