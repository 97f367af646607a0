//! Billing provider seam and its Stripe implementation

use std::collections::HashMap;

use async_trait::async_trait;
use practice_shared::{SubscriptionPeriod, UserId};
use stripe::{
    CancelSubscription, CheckoutSession, CheckoutSessionMode, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCustomer, Customer, CustomerId, Subscription,
    SubscriptionId,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Metadata key carrying the local user id on Stripe customers and sessions
pub const USER_ID_METADATA_KEY: &str = "supabase_user_id";
/// Metadata key carrying the billing period on checkout sessions
pub const PERIOD_METADATA_KEY: &str = "subscription_period";

/// Everything needed to open a subscription checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutParams {
    pub user_id: UserId,
    pub customer_id: String,
    pub price_id: String,
    pub period: SubscriptionPeriod,
    pub success_url: String,
    pub cancel_url: String,
}

/// Provider-hosted checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionInfo {
    pub id: String,
    pub url: Option<String>,
}

/// Outbound calls to the billing provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Create a customer tagged with the local user id. Returns the customer id.
    async fn create_customer(&self, email: &str, user_id: UserId) -> BillingResult<String>;

    async fn create_checkout_session(
        &self,
        params: CheckoutParams,
    ) -> BillingResult<CheckoutSessionInfo>;

    /// Cancel immediately. Returns the provider's `canceled_at` unix time.
    async fn cancel_subscription(&self, subscription_id: &str) -> BillingResult<Option<i64>>;
}

/// Stripe-backed gateway
#[derive(Clone)]
pub struct StripeGateway {
    stripe: StripeClient,
}

impl StripeGateway {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }
}

#[async_trait]
impl BillingGateway for StripeGateway {
    async fn create_customer(&self, email: &str, user_id: UserId) -> BillingResult<String> {
        let mut metadata = HashMap::new();
        metadata.insert(USER_ID_METADATA_KEY.to_string(), user_id.to_string());

        let params = CreateCustomer {
            email: Some(email),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params).await?;
        Ok(customer.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutParams,
    ) -> BillingResult<CheckoutSessionInfo> {
        let customer_id = params
            .customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut metadata = HashMap::new();
        metadata.insert(USER_ID_METADATA_KEY.to_string(), params.user_id.to_string());
        metadata.insert(
            PERIOD_METADATA_KEY.to_string(),
            params.period.as_str().to_string(),
        );

        let line_items = vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }];

        let create = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(line_items),
            success_url: Some(&params.success_url),
            cancel_url: Some(&params.cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            billing_address_collection: Some(
                stripe::CheckoutSessionBillingAddressCollection::Required,
            ),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), create).await?;

        Ok(CheckoutSessionInfo {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> BillingResult<Option<i64>> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid subscription ID: {}", e)))?;

        let params = CancelSubscription {
            cancellation_details: None,
            invoice_now: None,
            prorate: None,
        };

        let subscription = Subscription::cancel(self.stripe.inner(), &sub_id, params).await?;
        Ok(subscription.canceled_at)
    }
}
