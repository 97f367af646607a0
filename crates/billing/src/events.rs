//! Billing Events Module
//!
//! Append-only audit log of applied billing transitions. Answers "why is this
//! account cancelled?" without going to the Stripe dashboard.
//!
//! ## Event Types
//!
//! - Subscription lifecycle: activated, updated, cancelled
//! - Invoicing: paid, failed
//! - Customer and checkout provisioning

use std::sync::Arc;

use practice_shared::UserId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::SubscriptionStore;

/// Types of billing events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventType {
    SubscriptionActivated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    InvoicePaid,
    InvoiceFailed,
    CustomerCreated,
    CheckoutStarted,
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingEventType::SubscriptionActivated => "SUBSCRIPTION_ACTIVATED",
            BillingEventType::SubscriptionUpdated => "SUBSCRIPTION_UPDATED",
            BillingEventType::SubscriptionCancelled => "SUBSCRIPTION_CANCELLED",
            BillingEventType::InvoicePaid => "INVOICE_PAID",
            BillingEventType::InvoiceFailed => "INVOICE_FAILED",
            BillingEventType::CustomerCreated => "CUSTOMER_CREATED",
            BillingEventType::CheckoutStarted => "CHECKOUT_STARTED",
        };
        write!(f, "{}", s)
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    /// Therapist acting through the app
    User,
    /// System automation
    System,
    /// Stripe webhook
    Stripe,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::System => write!(f, "system"),
            ActorType::Stripe => write!(f, "stripe"),
        }
    }
}

/// A billing event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: Uuid,
    pub user_id: UserId,
    pub event_type: BillingEventType,
    pub event_data: serde_json::Value,
    pub stripe_event_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub actor_type: ActorType,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Builder for creating billing events
pub struct BillingEventBuilder {
    user_id: UserId,
    event_type: BillingEventType,
    event_data: serde_json::Value,
    stripe_event_id: Option<String>,
    stripe_subscription_id: Option<String>,
    stripe_customer_id: Option<String>,
    actor_type: ActorType,
}

impl BillingEventBuilder {
    /// Create a new event builder
    pub fn new(user_id: UserId, event_type: BillingEventType) -> Self {
        Self {
            user_id,
            event_type,
            event_data: serde_json::json!({}),
            stripe_event_id: None,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            actor_type: ActorType::System,
        }
    }

    /// Set the event data
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    /// Set the Stripe event ID
    pub fn stripe_event(mut self, event_id: impl Into<String>) -> Self {
        self.stripe_event_id = Some(event_id.into());
        self
    }

    /// Set the Stripe subscription ID
    pub fn stripe_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(subscription_id.into());
        self
    }

    /// Set the Stripe customer ID
    pub fn stripe_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.stripe_customer_id = Some(customer_id.into());
        self
    }

    pub fn actor_type(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }

    pub fn build(self) -> BillingEvent {
        BillingEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            event_type: self.event_type,
            event_data: self.event_data,
            stripe_event_id: self.stripe_event_id,
            stripe_subscription_id: self.stripe_subscription_id,
            stripe_customer_id: self.stripe_customer_id,
            actor_type: self.actor_type,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Writes audit events. Failures are logged and swallowed: the audit trail
/// never blocks a billing transition.
#[derive(Clone)]
pub struct BillingEventLogger {
    store: Arc<dyn SubscriptionStore>,
}

impl BillingEventLogger {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn log(&self, builder: BillingEventBuilder) {
        let event = builder.build();
        let event_type = event.event_type;
        let user_id = event.user_id;

        if let Err(e) = self.store.log_event(event).await {
            tracing::warn!(
                user_id = %user_id,
                event_type = %event_type,
                error = %e,
                "Failed to log billing event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_event_type_display() {
        assert_eq!(
            BillingEventType::SubscriptionActivated.to_string(),
            "SUBSCRIPTION_ACTIVATED"
        );
        assert_eq!(
            BillingEventType::SubscriptionCancelled.to_string(),
            "SUBSCRIPTION_CANCELLED"
        );
        assert_eq!(BillingEventType::InvoiceFailed.to_string(), "INVOICE_FAILED");
    }

    #[test]
    fn test_actor_type_display() {
        assert_eq!(ActorType::User.to_string(), "user");
        assert_eq!(ActorType::System.to_string(), "system");
        assert_eq!(ActorType::Stripe.to_string(), "stripe");
    }

    #[test]
    fn test_event_builder() {
        let user_id = UserId::new();
        let event = BillingEventBuilder::new(user_id, BillingEventType::InvoicePaid)
            .data(serde_json::json!({"test": true}))
            .stripe_subscription("sub_123")
            .actor_type(ActorType::Stripe)
            .build();

        assert_eq!(event.user_id, user_id);
        assert_eq!(event.event_type, BillingEventType::InvoicePaid);
        assert_eq!(event.stripe_subscription_id, Some("sub_123".to_string()));
        assert_eq!(event.stripe_event_id, None);
        assert_eq!(event.actor_type, ActorType::Stripe);
    }
}
