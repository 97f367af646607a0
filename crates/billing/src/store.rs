//! Persistence for subscription state, the webhook ledger and the audit log

use async_trait::async_trait;
use practice_shared::{SubscriptionPeriod, SubscriptionStatus, UserBilling, UserId};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::events::BillingEvent;

/// Minutes after which a `processing` ledger row may be claimed again
pub const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Final result recorded for a claimed webhook event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingResult {
    Success,
    Skipped,
    Error,
}

impl ProcessingResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields written when a checkout completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutActivation {
    pub subscription_id: String,
    pub customer_id: Option<String>,
    pub period: SubscriptionPeriod,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

/// Storage seam for billing state
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn ping(&self) -> BillingResult<()>;

    async fn find_user(&self, user_id: UserId) -> BillingResult<Option<UserBilling>>;

    async fn find_user_by_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Option<UserBilling>>;

    async fn set_customer_id(&self, user_id: UserId, customer_id: &str) -> BillingResult<()>;

    /// Mark the user active on a new subscription. Returns false when no row matched.
    async fn apply_checkout(
        &self,
        user_id: UserId,
        activation: &CheckoutActivation,
    ) -> BillingResult<bool>;

    /// Overwrite the status. `end` replaces `subscription_end_date` when present.
    async fn update_status(
        &self,
        user_id: UserId,
        status: SubscriptionStatus,
        end: Option<OffsetDateTime>,
    ) -> BillingResult<()>;

    /// Claim exclusive processing of a provider event. Returns false when the
    /// event already succeeded, was skipped, or is being processed elsewhere.
    async fn claim_event(
        &self,
        event_id: &str,
        event_type: &str,
        event_timestamp: OffsetDateTime,
    ) -> BillingResult<bool>;

    async fn complete_event(
        &self,
        event_id: &str,
        result: ProcessingResult,
        error_message: Option<&str>,
    ) -> BillingResult<()>;

    async fn log_event(&self, event: BillingEvent) -> BillingResult<()>;

    /// Delete finished ledger rows older than the retention window
    async fn prune_events(&self, retention_days: i32) -> BillingResult<u64>;

    /// Ledger rows stuck in `processing` past the timeout
    async fn count_stuck_events(&self) -> BillingResult<i64>;
}

const USER_COLUMNS: &str = r#"
    id, email, subscription_status, subscription_period,
    stripe_customer_id, stripe_subscription_id,
    trial_start_date, subscription_start_date, subscription_end_date, updated_at
"#;

/// Postgres-backed store
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn ping(&self) -> BillingResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, user_id: UserId) -> BillingResult<Option<UserBilling>> {
        let user = sqlx::query_as::<_, UserBilling>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Option<UserBilling>> {
        let user = sqlx::query_as::<_, UserBilling>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE stripe_subscription_id = $1 LIMIT 1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_customer_id(&self, user_id: UserId, customer_id: &str) -> BillingResult<()> {
        sqlx::query(
            "UPDATE users SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(customer_id)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_checkout(
        &self,
        user_id: UserId,
        activation: &CheckoutActivation,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = 'active',
                subscription_period = $1,
                stripe_subscription_id = $2,
                stripe_customer_id = COALESCE($3, stripe_customer_id),
                subscription_start_date = $4,
                subscription_end_date = $5,
                updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(activation.period.as_str())
        .bind(&activation.subscription_id)
        .bind(&activation.customer_id)
        .bind(activation.start)
        .bind(activation.end)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &self,
        user_id: UserId,
        status: SubscriptionStatus,
        end: Option<OffsetDateTime>,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = $1,
                subscription_end_date = COALESCE($2, subscription_end_date),
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(end)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_event(
        &self,
        event_id: &str,
        event_type: &str,
        event_timestamp: OffsetDateTime,
    ) -> BillingResult<bool> {
        // Errored attempts and claims stuck past the timeout are re-claimable
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                processed_at = NULL
            WHERE stripe_webhook_events.processing_result = 'error'
               OR (stripe_webhook_events.processing_result = 'processing'
                   AND stripe_webhook_events.processing_started_at < NOW() - ($4 || ' minutes')::INTERVAL)
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(event_timestamp)
        .bind(PROCESSING_TIMEOUT_MINUTES.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn complete_event(
        &self,
        event_id: &str,
        result: ProcessingResult,
        error_message: Option<&str>,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_result = $1, error_message = $2, processed_at = NOW()
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(result.as_str())
        .bind(error_message)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn log_event(&self, event: BillingEvent) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_events (
                id,
                user_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                stripe_customer_id,
                actor_type,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id.0)
        .bind(event.event_type.to_string())
        .bind(&event.event_data)
        .bind(&event.stripe_event_id)
        .bind(&event.stripe_subscription_id)
        .bind(&event.stripe_customer_id)
        .bind(event.actor_type.to_string())
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn prune_events(&self, retention_days: i32) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM stripe_webhook_events
            WHERE processed_at < NOW() - ($1 || ' days')::INTERVAL
              AND processing_result IN ('success', 'skipped')
            "#,
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_stuck_events(&self) -> BillingResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM stripe_webhook_events
            WHERE processing_result = 'processing'
              AND processing_started_at < NOW() - ($1 || ' minutes')::INTERVAL
            "#,
        )
        .bind(PROCESSING_TIMEOUT_MINUTES.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
