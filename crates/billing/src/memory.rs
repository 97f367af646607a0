//! In-memory store for tests and local runs without Postgres

use std::collections::HashMap;

use async_trait::async_trait;
use practice_shared::{SubscriptionStatus, UserBilling, UserId};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::BillingResult;
use crate::events::BillingEvent;
use crate::store::{
    CheckoutActivation, ProcessingResult, SubscriptionStore, PROCESSING_TIMEOUT_MINUTES,
};

#[derive(Debug, Clone)]
struct LedgerEntry {
    result: Option<ProcessingResult>,
    started_at: OffsetDateTime,
    processed_at: Option<OffsetDateTime>,
    error_message: Option<String>,
}

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserBilling>,
    ledger: HashMap<String, LedgerEntry>,
    audit: Vec<BillingEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserBilling) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn user(&self, user_id: UserId) -> Option<UserBilling> {
        self.state.read().await.users.get(&user_id).cloned()
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }

    /// Recorded result of a ledger row; `None` while processing or when absent
    pub async fn ledger_result(&self, event_id: &str) -> Option<ProcessingResult> {
        self.state
            .read()
            .await
            .ledger
            .get(event_id)
            .and_then(|entry| entry.result)
    }

    pub async fn ledger_error(&self, event_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .ledger
            .get(event_id)
            .and_then(|entry| entry.error_message.clone())
    }

    pub async fn audit_events(&self) -> Vec<BillingEvent> {
        self.state.read().await.audit.clone()
    }
}

fn timeout() -> time::Duration {
    time::Duration::minutes(i64::from(PROCESSING_TIMEOUT_MINUTES))
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn ping(&self) -> BillingResult<()> {
        Ok(())
    }

    async fn find_user(&self, user_id: UserId) -> BillingResult<Option<UserBilling>> {
        Ok(self.user(user_id).await)
    }

    async fn find_user_by_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Option<UserBilling>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn set_customer_id(&self, user_id: UserId, customer_id: &str) -> BillingResult<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.stripe_customer_id = Some(customer_id.to_string());
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn apply_checkout(
        &self,
        user_id: UserId,
        activation: &CheckoutActivation,
    ) -> BillingResult<bool> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };

        user.subscription_status = SubscriptionStatus::Active;
        user.subscription_period = Some(activation.period);
        user.stripe_subscription_id = Some(activation.subscription_id.clone());
        if let Some(customer_id) = &activation.customer_id {
            user.stripe_customer_id = Some(customer_id.clone());
        }
        user.subscription_start_date = Some(activation.start);
        user.subscription_end_date = Some(activation.end);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn update_status(
        &self,
        user_id: UserId,
        status: SubscriptionStatus,
        end: Option<OffsetDateTime>,
    ) -> BillingResult<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.subscription_status = status;
            if end.is_some() {
                user.subscription_end_date = end;
            }
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn claim_event(
        &self,
        event_id: &str,
        _event_type: &str,
        _event_timestamp: OffsetDateTime,
    ) -> BillingResult<bool> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.write().await;

        let reclaimable = match state.ledger.get(event_id) {
            None => true,
            Some(entry) => match entry.result {
                Some(ProcessingResult::Error) => true,
                None => entry.started_at < now - timeout(),
                Some(_) => false,
            },
        };

        if reclaimable {
            state.ledger.insert(
                event_id.to_string(),
                LedgerEntry {
                    result: None,
                    started_at: now,
                    processed_at: None,
                    error_message: None,
                },
            );
        }
        Ok(reclaimable)
    }

    async fn complete_event(
        &self,
        event_id: &str,
        result: ProcessingResult,
        error_message: Option<&str>,
    ) -> BillingResult<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.ledger.get_mut(event_id) {
            entry.result = Some(result);
            entry.processed_at = Some(OffsetDateTime::now_utc());
            entry.error_message = error_message.map(str::to_string);
        }
        Ok(())
    }

    async fn log_event(&self, event: BillingEvent) -> BillingResult<()> {
        self.state.write().await.audit.push(event);
        Ok(())
    }

    async fn prune_events(&self, retention_days: i32) -> BillingResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - time::Duration::days(i64::from(retention_days));
        let mut state = self.state.write().await;
        let before = state.ledger.len();
        state.ledger.retain(|_, entry| {
            let finished = matches!(
                entry.result,
                Some(ProcessingResult::Success | ProcessingResult::Skipped)
            );
            !(finished && entry.processed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - state.ledger.len()) as u64)
    }

    async fn count_stuck_events(&self) -> BillingResult<i64> {
        let cutoff = OffsetDateTime::now_utc() - timeout();
        let state = self.state.read().await;
        Ok(state
            .ledger
            .values()
            .filter(|entry| entry.result.is_none() && entry.started_at < cutoff)
            .count() as i64)
    }
}
