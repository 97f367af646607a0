//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Webhook signature verification failed: {0}")]
    WebhookSignatureInvalid(&'static str),

    #[error("Webhook payload invalid: {0}")]
    WebhookPayload(String),

    #[error("Webhook event data invalid: {0}")]
    EventData(String),

    #[error("Webhook event is missing {0}")]
    MissingField(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Subscription does not belong to this user")]
    SubscriptionMismatch,
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
