//! Stripe Checkout sessions

use std::sync::Arc;

use practice_shared::UserId;
use serde::Serialize;

use crate::client::StripeConfig;
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::gateway::{BillingGateway, CheckoutParams};
use crate::store::SubscriptionStore;

/// Returned to the client so it can redirect to the hosted payment page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Checkout service for creating Stripe checkout sessions
#[derive(Clone)]
pub struct CheckoutService {
    config: StripeConfig,
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn BillingGateway>,
    customers: CustomerService,
    event_logger: BillingEventLogger,
}

impl CheckoutService {
    pub fn new(
        config: StripeConfig,
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn BillingGateway>,
    ) -> Self {
        Self {
            config,
            customers: CustomerService::new(store.clone(), gateway.clone()),
            event_logger: BillingEventLogger::new(store.clone()),
            store,
            gateway,
        }
    }

    /// Create a subscription-mode checkout session for a user.
    ///
    /// Provisions the Stripe customer on first use. Redirect URLs fall back to
    /// the dashboard when the caller does not supply them.
    pub async fn create_subscription_checkout(
        &self,
        user_id: UserId,
        price_id: &str,
        success_url: Option<String>,
        cancel_url: Option<String>,
    ) -> BillingResult<CheckoutResponse> {
        let price_id = price_id.trim();
        if price_id.is_empty() {
            return Err(BillingError::InvalidInput("priceId is required".to_string()));
        }

        let period = self
            .config
            .period_for_price_id(price_id)
            .ok_or_else(|| BillingError::InvalidInput(format!("Unknown price: {}", price_id)))?;

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))?;

        let customer_id = self.customers.get_or_create_customer(&user).await?;

        let params = CheckoutParams {
            user_id,
            customer_id: customer_id.clone(),
            price_id: price_id.to_string(),
            period,
            success_url: success_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.config.default_success_url()),
            cancel_url: cancel_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.config.default_cancel_url()),
        };

        let session = self.gateway.create_checkout_session(params).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            period = %period,
            "Created checkout session"
        );

        self.event_logger
            .log(
                BillingEventBuilder::new(user_id, BillingEventType::CheckoutStarted)
                    .data(serde_json::json!({
                        "price_id": price_id,
                        "period": period.as_str(),
                        "session_id": session.id,
                    }))
                    .stripe_customer(customer_id)
                    .actor_type(ActorType::User),
            )
            .await;

        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        })
    }
}
