//! Common types used across the practice billing workspace

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::SharedError;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper (the auth provider's user id, also the `users.id` primary key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| SharedError::InvalidValue {
                field: "user_id",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Denormalized subscription lifecycle field stored on each user row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// New accounts start here until a checkout completes
    #[default]
    Trialing,
    Active,
    PastDue,
    Cancelled,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
            Self::Inactive => "inactive",
        }
    }

    /// Whether this status unlocks the practice features
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Trialing | Self::Active)
    }

    /// Map a Stripe subscription status onto the local lifecycle field.
    ///
    /// Stripe reports `canceled` (one L) and a few states the application does
    /// not distinguish; unknown values collapse to `Inactive`.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" | "unpaid" => Self::PastDue,
            "canceled" | "cancelled" | "incomplete_expired" => Self::Cancelled,
            _ => Self::Inactive,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "cancelled" => Ok(Self::Cancelled),
            "inactive" => Ok(Self::Inactive),
            other => Err(SharedError::InvalidValue {
                field: "subscription_status",
                value: other.to_string(),
            }),
        }
    }
}

/// Billing cadence of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPeriod {
    #[default]
    Monthly,
    Annual,
}

impl SubscriptionPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }

    /// Length of one paid period, used to seed `subscription_end_date` at checkout
    pub fn length(&self) -> time::Duration {
        match self {
            Self::Monthly => time::Duration::days(30),
            Self::Annual => time::Duration::days(365),
        }
    }
}

impl fmt::Display for SubscriptionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionPeriod {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" | "month" => Ok(Self::Monthly),
            "annual" | "yearly" | "year" => Ok(Self::Annual),
            other => Err(SharedError::InvalidValue {
                field: "subscription_period",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// User billing projection
// =============================================================================

/// The billing-related columns of a `users` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBilling {
    pub id: UserId,
    pub email: String,
    pub subscription_status: SubscriptionStatus,
    pub subscription_period: Option<SubscriptionPeriod>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_end_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserBilling {
    /// A freshly provisioned account: trialing, no billing identifiers yet
    pub fn new_trial(id: UserId, email: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            email: email.into(),
            subscription_status: SubscriptionStatus::Trialing,
            subscription_period: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            trial_start_date: Some(now),
            subscription_start_date: None,
            subscription_end_date: None,
            updated_at: now,
        }
    }
}

fn decode_err(column: &'static str, err: SharedError) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    }
}

impl<'r> FromRow<'r, PgRow> for UserBilling {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("subscription_status")?;
        let period: Option<String> = row.try_get("subscription_period")?;

        Ok(Self {
            id: UserId(row.try_get("id")?),
            email: row.try_get("email")?,
            subscription_status: status
                .parse()
                .map_err(|e| decode_err("subscription_status", e))?,
            subscription_period: period
                .map(|p| p.parse())
                .transpose()
                .map_err(|e| decode_err("subscription_period", e))?,
            stripe_customer_id: row.try_get("stripe_customer_id")?,
            stripe_subscription_id: row.try_get("stripe_subscription_id")?,
            trial_start_date: row.try_get("trial_start_date")?,
            subscription_start_date: row.try_get("subscription_start_date")?,
            subscription_end_date: row.try_get("subscription_end_date")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Inactive,
        ] {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>(), Ok(status));
        }
        assert!("canceled".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(SubscriptionStatus::from_provider("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_provider("trialing"), SubscriptionStatus::Trialing);
        assert_eq!(SubscriptionStatus::from_provider("past_due"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_provider("unpaid"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_provider("canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired"),
            SubscriptionStatus::Cancelled
        );
        assert_eq!(SubscriptionStatus::from_provider("incomplete"), SubscriptionStatus::Inactive);
        assert_eq!(SubscriptionStatus::from_provider("paused"), SubscriptionStatus::Inactive);
        assert_eq!(
            SubscriptionStatus::from_provider("something_new"),
            SubscriptionStatus::Inactive
        );
    }

    #[test]
    fn test_access_is_granted_only_while_trialing_or_active() {
        assert!(SubscriptionStatus::Trialing.grants_access());
        assert!(SubscriptionStatus::Active.grants_access());
        assert!(!SubscriptionStatus::PastDue.grants_access());
        assert!(!SubscriptionStatus::Cancelled.grants_access());
        assert!(!SubscriptionStatus::Inactive.grants_access());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }

    #[test]
    fn test_period_parsing_and_length() {
        assert_eq!("Month".parse::<SubscriptionPeriod>(), Ok(SubscriptionPeriod::Monthly));
        assert_eq!("yearly".parse::<SubscriptionPeriod>(), Ok(SubscriptionPeriod::Annual));
        assert!("weekly".parse::<SubscriptionPeriod>().is_err());
        assert_eq!(SubscriptionPeriod::Monthly.length().whole_days(), 30);
        assert_eq!(SubscriptionPeriod::Annual.length().whole_days(), 365);
    }

    #[test]
    fn test_user_id_parse_rejects_garbage() {
        let id = UserId::new();
        assert_eq!(id.to_string().parse::<UserId>(), Ok(id));
        assert!(matches!(
            "not-a-uuid".parse::<UserId>(),
            Err(SharedError::InvalidValue { field: "user_id", .. })
        ));
    }

    #[test]
    fn test_new_trial_has_no_billing_ids() {
        let user = UserBilling::new_trial(UserId::new(), "therapist@example.com");
        assert_eq!(user.subscription_status, SubscriptionStatus::Trialing);
        assert!(user.stripe_customer_id.is_none());
        assert!(user.stripe_subscription_id.is_none());
        assert!(user.trial_start_date.is_some());
    }
}
