//! Application state

use std::sync::Arc;

use practice_billing::{BillingService, SubscriptionStore};

use crate::{auth::JwtManager, config::Config, error::ApiError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub store: Arc<dyn SubscriptionStore>,
    /// Billing service (None when ENABLE_BILLING=false)
    pub billing: Option<Arc<BillingService>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SubscriptionStore>,
        billing: Option<Arc<BillingService>>,
    ) -> Self {
        Self {
            jwt_manager: JwtManager::new(&config.supabase_jwt_secret),
            config,
            store,
            billing,
        }
    }

    /// The billing service, or 503 when billing is disabled
    pub fn billing(&self) -> Result<&BillingService, ApiError> {
        self.billing.as_deref().ok_or(ApiError::ServiceUnavailable)
    }
}
