#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Practice Billing
//!
//! Stripe subscription handling for the practice app:
//! - Webhook signature verification and event reconciliation
//! - Checkout sessions with lazy customer provisioning
//! - Immediate cancellation
//! - Webhook ledger and billing audit log

pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod events;
pub mod gateway;
pub mod memory;
pub mod signature;
pub mod store;
pub mod subscriptions;
pub mod webhooks;

use std::sync::Arc;

pub use checkout::{CheckoutResponse, CheckoutService};
pub use client::{PriceIds, StripeClient, StripeConfig};
pub use customer::CustomerService;
pub use error::{BillingError, BillingResult};
pub use events::{
    ActorType, BillingEvent, BillingEventBuilder, BillingEventLogger, BillingEventType,
};
pub use gateway::{BillingGateway, CheckoutParams, CheckoutSessionInfo, StripeGateway};
pub use memory::MemoryStore;
pub use store::{CheckoutActivation, PgSubscriptionStore, ProcessingResult, SubscriptionStore};
pub use subscriptions::{CancelResponse, SubscriptionService, SubscriptionSummary};
pub use webhooks::{WebhookEvent, WebhookHandler, WebhookOutcome};

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub checkout: CheckoutService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    pub fn new(
        config: StripeConfig,
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn BillingGateway>,
    ) -> Self {
        Self {
            webhooks: WebhookHandler::new(config.webhook_secret.clone(), store.clone()),
            subscriptions: SubscriptionService::new(store.clone(), gateway.clone()),
            checkout: CheckoutService::new(config, store, gateway),
        }
    }

    /// Build the production service: Stripe gateway over a Postgres store
    pub fn with_stripe(stripe: StripeClient, store: Arc<dyn SubscriptionStore>) -> Self {
        let config = stripe.config().clone();
        Self::new(config, store, Arc::new(StripeGateway::new(stripe)))
    }
}
