//! Stripe webhook handling
//!
//! Reconciles the denormalized subscription fields on `users` from Stripe
//! events. Every write is a blind overwrite of the current value, so repeated
//! delivery converges; the ledger additionally keeps a replay from running
//! handlers twice.

use std::collections::HashMap;
use std::sync::Arc;

use practice_shared::{SubscriptionPeriod, SubscriptionStatus, UserId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::gateway::{PERIOD_METADATA_KEY, USER_ID_METADATA_KEY};
use crate::signature::{verify_signature, DEFAULT_TOLERANCE_SECS};
use crate::store::{CheckoutActivation, ProcessingResult, SubscriptionStore};

/// Event type strings routed to a handler
pub mod event_types {
    pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
    pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
    pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
    pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
    pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";
}

/// A verified Stripe event envelope.
///
/// Deserialized with our own types rather than `stripe::Event` so newer API
/// versions with unknown fields and event types still parse.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub created: i64,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// A reference Stripe sends either as a bare id or as an expanded object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    subscription: Option<Expandable>,
    #[serde(default)]
    customer: Option<Expandable>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
    #[serde(default)]
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    subscription: Option<Expandable>,
}

/// What happened to a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A user row was written
    Applied,
    /// Nothing to write: no matching user or no subscription reference
    Skipped,
    /// Already processed or in flight elsewhere
    Duplicate,
    /// No handler for this event type
    Unhandled,
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    webhook_secret: Option<String>,
    store: Arc<dyn SubscriptionStore>,
    event_logger: BillingEventLogger,
}

impl WebhookHandler {
    pub fn new(webhook_secret: Option<String>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            webhook_secret,
            event_logger: BillingEventLogger::new(store.clone()),
            store,
        }
    }

    /// Verify the signature over the raw body and parse the event
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.verify_event_at(payload, signature, now)
    }

    fn verify_event_at(
        &self,
        payload: &str,
        signature: &str,
        now: i64,
    ) -> BillingResult<WebhookEvent> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            tracing::error!("STRIPE_WEBHOOK_SECRET is not configured");
            BillingError::Config("Webhook configuration error".to_string())
        })?;

        verify_signature(payload, signature, secret, now, DEFAULT_TOLERANCE_SECS)?;

        let event: WebhookEvent = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookPayload(e.to_string())
        })?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.type_,
            "Webhook signature verified"
        );

        Ok(event)
    }

    /// Handle a verified event.
    ///
    /// Claims the event id in the ledger first; a replay of an event that
    /// already succeeded or is in flight returns `Duplicate` without running
    /// handlers.
    pub async fn handle_event(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        let claimed = self
            .store
            .claim_event(&event.id, &event.type_, event_timestamp)
            .await
            .map_err(|e| {
                tracing::error!(
                    event_id = %event.id,
                    error = %e,
                    "Failed to claim webhook event for processing"
                );
                e
            })?;

        if !claimed {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.type_,
                "Duplicate webhook event, skipping"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.type_,
            "Processing Stripe webhook event"
        );

        let result = self.process_event(event).await;

        let (processing_result, error_message) = match &result {
            Ok(WebhookOutcome::Applied) => (ProcessingResult::Success, None),
            Ok(_) => (ProcessingResult::Skipped, None),
            Err(e) => (ProcessingResult::Error, Some(e.to_string())),
        };

        if let Err(e) = self
            .store
            .complete_event(&event.id, processing_result, error_message.as_deref())
            .await
        {
            // The row stays in 'processing' and becomes re-claimable after the timeout
            tracing::error!(
                event_id = %event.id,
                processing_result = %processing_result,
                error = %e,
                "Failed to record webhook processing result"
            );
        }

        result
    }

    async fn process_event(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        match event.type_.as_str() {
            event_types::CHECKOUT_SESSION_COMPLETED => self.handle_checkout_completed(event).await,
            event_types::SUBSCRIPTION_UPDATED => self.handle_subscription_updated(event).await,
            event_types::SUBSCRIPTION_DELETED => self.handle_subscription_deleted(event).await,
            event_types::INVOICE_PAYMENT_SUCCEEDED => {
                self.handle_invoice(event, SubscriptionStatus::Active).await
            }
            event_types::INVOICE_PAYMENT_FAILED => {
                self.handle_invoice(event, SubscriptionStatus::PastDue).await
            }
            _ => {
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type"
                );
                Ok(WebhookOutcome::Unhandled)
            }
        }
    }

    async fn handle_checkout_completed(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let session: CheckoutSessionObject = parse_object(event)?;
        let metadata = session.metadata.unwrap_or_default();

        let user_id = metadata
            .get(USER_ID_METADATA_KEY)
            .filter(|v| !v.is_empty())
            .ok_or(BillingError::MissingField("supabase_user_id metadata"))?
            .parse::<UserId>()
            .map_err(|_| BillingError::EventData("invalid supabase_user_id".to_string()))?;

        let subscription_id = session
            .subscription
            .map(Expandable::into_id)
            .ok_or(BillingError::MissingField("subscription"))?;

        let period = metadata
            .get(PERIOD_METADATA_KEY)
            .and_then(|p| p.parse::<SubscriptionPeriod>().ok())
            .unwrap_or_default();

        let start = OffsetDateTime::now_utc();
        let activation = CheckoutActivation {
            subscription_id: subscription_id.clone(),
            customer_id: session.customer.map(Expandable::into_id),
            period,
            start,
            end: start + period.length(),
        };

        if !self.store.apply_checkout(user_id, &activation).await? {
            tracing::warn!(
                user_id = %user_id,
                session_id = %session.id,
                "Checkout completed for unknown user"
            );
            return Ok(WebhookOutcome::Skipped);
        }

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription_id,
            period = %period,
            "Subscription activated from checkout"
        );

        let mut builder = BillingEventBuilder::new(user_id, BillingEventType::SubscriptionActivated)
            .data(serde_json::json!({
                "period": period.as_str(),
                "session_id": session.id,
            }))
            .stripe_event(&event.id)
            .stripe_subscription(&subscription_id)
            .actor_type(ActorType::Stripe);
        if let Some(customer_id) = activation.customer_id {
            builder = builder.stripe_customer(customer_id);
        }
        self.event_logger.log(builder).await;

        Ok(WebhookOutcome::Applied)
    }

    async fn handle_subscription_updated(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let subscription: SubscriptionObject = parse_object(event)?;

        let Some(user) = self.store.find_user_by_subscription(&subscription.id).await? else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "No user found for subscription"
            );
            return Ok(WebhookOutcome::Skipped);
        };

        let status = SubscriptionStatus::from_provider(&subscription.status);
        let end = subscription
            .current_period_end
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());

        self.store.update_status(user.id, status, end).await?;

        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            provider_status = %subscription.status,
            status = %status,
            "Subscription updated"
        );

        self.event_logger
            .log(
                BillingEventBuilder::new(user.id, BillingEventType::SubscriptionUpdated)
                    .data(serde_json::json!({
                        "status": status.as_str(),
                        "provider_status": subscription.status,
                        "previous_status": user.subscription_status.as_str(),
                    }))
                    .stripe_event(&event.id)
                    .stripe_subscription(&subscription.id)
                    .actor_type(ActorType::Stripe),
            )
            .await;

        Ok(WebhookOutcome::Applied)
    }

    async fn handle_subscription_deleted(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let subscription: SubscriptionObject = parse_object(event)?;

        let Some(user) = self.store.find_user_by_subscription(&subscription.id).await? else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "No user found for deleted subscription"
            );
            return Ok(WebhookOutcome::Skipped);
        };

        self.store
            .update_status(
                user.id,
                SubscriptionStatus::Cancelled,
                Some(OffsetDateTime::now_utc()),
            )
            .await?;

        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            "Subscription cancelled"
        );

        self.event_logger
            .log(
                BillingEventBuilder::new(user.id, BillingEventType::SubscriptionCancelled)
                    .data(serde_json::json!({ "source": "stripe" }))
                    .stripe_event(&event.id)
                    .stripe_subscription(&subscription.id)
                    .actor_type(ActorType::Stripe),
            )
            .await;

        Ok(WebhookOutcome::Applied)
    }

    async fn handle_invoice(
        &self,
        event: &WebhookEvent,
        status: SubscriptionStatus,
    ) -> BillingResult<WebhookOutcome> {
        let invoice: InvoiceObject = parse_object(event)?;

        // One-off invoices carry no subscription
        let Some(subscription_id) = invoice.subscription.map(Expandable::into_id) else {
            tracing::debug!(event_id = %event.id, "Invoice has no subscription");
            return Ok(WebhookOutcome::Skipped);
        };

        let Some(user) = self.store.find_user_by_subscription(&subscription_id).await? else {
            tracing::warn!(
                subscription_id = %subscription_id,
                "No user found for invoice subscription"
            );
            return Ok(WebhookOutcome::Skipped);
        };

        self.store.update_status(user.id, status, None).await?;

        let event_type = if status == SubscriptionStatus::Active {
            BillingEventType::InvoicePaid
        } else {
            tracing::warn!(
                user_id = %user.id,
                subscription_id = %subscription_id,
                "Invoice payment failed, subscription past due"
            );
            BillingEventType::InvoiceFailed
        };

        self.event_logger
            .log(
                BillingEventBuilder::new(user.id, event_type)
                    .data(serde_json::json!({ "invoice_id": invoice.id }))
                    .stripe_event(&event.id)
                    .stripe_subscription(&subscription_id)
                    .actor_type(ActorType::Stripe),
            )
            .await;

        Ok(WebhookOutcome::Applied)
    }
}

fn parse_object<T: DeserializeOwned>(event: &WebhookEvent) -> BillingResult<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::error!(
            event_id = %event.id,
            event_type = %event.type_,
            error = %e,
            "Unexpected event object shape"
        );
        BillingError::EventData(e.to_string())
    })
}
