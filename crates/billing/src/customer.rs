//! Stripe customer management

use std::sync::Arc;

use practice_shared::UserBilling;

use crate::error::BillingResult;
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::gateway::BillingGateway;
use crate::store::SubscriptionStore;

/// Customer service for managing Stripe customers
#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn BillingGateway>,
    event_logger: BillingEventLogger,
}

impl CustomerService {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn BillingGateway>) -> Self {
        Self {
            event_logger: BillingEventLogger::new(store.clone()),
            store,
            gateway,
        }
    }

    /// Return the user's Stripe customer id, creating the customer on first use
    pub async fn get_or_create_customer(&self, user: &UserBilling) -> BillingResult<String> {
        if let Some(customer_id) = user.stripe_customer_id.as_deref().filter(|c| !c.is_empty()) {
            return Ok(customer_id.to_string());
        }

        let customer_id = self.gateway.create_customer(&user.email, user.id).await?;
        self.store.set_customer_id(user.id, &customer_id).await?;

        tracing::info!(
            user_id = %user.id,
            customer_id = %customer_id,
            "Created Stripe customer"
        );

        self.event_logger
            .log(
                BillingEventBuilder::new(user.id, BillingEventType::CustomerCreated)
                    .stripe_customer(&customer_id)
                    .actor_type(ActorType::User),
            )
            .await;

        Ok(customer_id)
    }
}
