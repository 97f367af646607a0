//! Stripe client configuration

use practice_shared::SubscriptionPeriod;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret. Webhooks answer 500 until it is set.
    pub webhook_secret: Option<String>,
    /// Price IDs for each billing period
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
}

/// Stripe price IDs for the practice subscription
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub monthly: String,
    pub annual: Option<String>,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            price_ids: PriceIds {
                monthly: std::env::var("STRIPE_PRICE_MONTHLY")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_MONTHLY not set".to_string()))?,
                annual: std::env::var("STRIPE_PRICE_ANNUAL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8888".to_string()),
        })
    }

    /// Billing period for a configured price ID
    pub fn period_for_price_id(&self, price_id: &str) -> Option<SubscriptionPeriod> {
        if price_id == self.price_ids.monthly {
            Some(SubscriptionPeriod::Monthly)
        } else if self.price_ids.annual.as_deref() == Some(price_id) {
            Some(SubscriptionPeriod::Annual)
        } else {
            None
        }
    }

    /// Default redirect after a completed checkout. The placeholder is
    /// substituted by Stripe.
    pub fn default_success_url(&self) -> String {
        format!(
            "{}/dashboard?session_id={{CHECKOUT_SESSION_ID}}",
            self.app_base_url.trim_end_matches('/')
        )
    }

    pub fn default_cancel_url(&self) -> String {
        format!("{}/dashboard/profile", self.app_base_url.trim_end_matches('/'))
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_123".to_string(),
        webhook_secret: Some("whsec_test_secret".to_string()),
        price_ids: PriceIds {
            monthly: "price_monthly".to_string(),
            annual: Some("price_annual".to_string()),
        },
        app_base_url: "https://app.example.com/".to_string(),
    }
}
