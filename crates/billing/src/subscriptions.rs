//! Subscription reads and user-initiated cancellation

use std::sync::Arc;

use practice_shared::{SubscriptionPeriod, SubscriptionStatus, UserId};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::gateway::BillingGateway;
use crate::store::SubscriptionStore;

/// The caller's subscription as shown on the profile page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub status: SubscriptionStatus,
    pub period: Option<SubscriptionPeriod>,
    pub subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub has_access: bool,
}

/// Result of an immediate cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub message: String,
    /// Provider cancellation time, unix seconds
    pub cancel_at: Option<i64>,
}

#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn BillingGateway>,
    event_logger: BillingEventLogger,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn BillingGateway>) -> Self {
        Self {
            event_logger: BillingEventLogger::new(store.clone()),
            store,
            gateway,
        }
    }

    pub async fn get_subscription(&self, user_id: UserId) -> BillingResult<SubscriptionSummary> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))?;

        Ok(SubscriptionSummary {
            status: user.subscription_status,
            period: user.subscription_period,
            subscription_id: user.stripe_subscription_id,
            trial_start_date: user.trial_start_date,
            start_date: user.subscription_start_date,
            end_date: user.subscription_end_date,
            has_access: user.subscription_status.grants_access(),
        })
    }

    /// Cancel the caller's subscription immediately.
    ///
    /// The requested id must equal the one stored for the caller. The local
    /// row is written only after the provider accepts the cancellation.
    pub async fn cancel_subscription(
        &self,
        user_id: UserId,
        subscription_id: &str,
    ) -> BillingResult<CancelResponse> {
        let subscription_id = subscription_id.trim();
        if subscription_id.is_empty() {
            return Err(BillingError::InvalidInput(
                "subscriptionId is required".to_string(),
            ));
        }

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))?;

        if user.stripe_subscription_id.as_deref() != Some(subscription_id) {
            tracing::warn!(
                user_id = %user_id,
                subscription_id = %subscription_id,
                "Cancellation requested for a subscription the user does not own"
            );
            return Err(BillingError::SubscriptionMismatch);
        }

        let canceled_at = self.gateway.cancel_subscription(subscription_id).await?;

        let now = OffsetDateTime::now_utc();
        self.store
            .update_status(user_id, SubscriptionStatus::Cancelled, Some(now))
            .await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription_id,
            "Cancelled subscription"
        );

        self.event_logger
            .log(
                BillingEventBuilder::new(user_id, BillingEventType::SubscriptionCancelled)
                    .data(serde_json::json!({ "source": "user" }))
                    .stripe_subscription(subscription_id)
                    .actor_type(ActorType::User),
            )
            .await;

        Ok(CancelResponse {
            message: "Subscription cancelled successfully".to_string(),
            cancel_at: canceled_at,
        })
    }
}
