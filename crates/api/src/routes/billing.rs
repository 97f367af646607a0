//! Billing routes for Stripe integration

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::HeaderMap,
    Json,
};
use practice_billing::{CancelResponse, CheckoutResponse, SubscriptionSummary, WebhookOutcome};
use serde::{Deserialize, Serialize};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub price_id: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// Request to cancel the caller's subscription
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub subscription_id: Option<String>,
}

/// Acknowledgement returned to Stripe
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected request body");
        ApiError::BadRequest(rejection.body_text())
    })
}

/// Handle Stripe webhook events
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    tracing::debug!(body_len = body.len(), "Stripe webhook received");

    let billing = state.billing()?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("No Stripe signature found".to_string())
        })?;

    let event = billing.webhooks.verify_event(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Stripe webhook verification failed");
        ApiError::from(e)
    })?;

    let outcome = billing.webhooks.handle_event(&event).await.map_err(|e| {
        tracing::error!(
            event_id = %event.id,
            event_type = %event.type_,
            error = %e,
            "Webhook handling error"
        );
        ApiError::from(e)
    })?;

    if outcome == WebhookOutcome::Applied {
        tracing::info!(event_id = %event.id, "Stripe webhook processed successfully");
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Create a checkout session for the practice subscription
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let billing = state.billing()?;
    let req = json_body(body)?;

    let price_id = req
        .price_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("priceId is required".to_string()))?;

    let session = billing
        .checkout
        .create_subscription_checkout(auth_user.user_id, &price_id, req.success_url, req.cancel_url)
        .await?;

    Ok(Json(session))
}

/// Cancel the caller's subscription immediately
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Result<Json<CancelSubscriptionRequest>, JsonRejection>,
) -> Result<Json<CancelResponse>, ApiError> {
    let billing = state.billing()?;
    let req = json_body(body)?;

    let subscription_id = req
        .subscription_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("subscriptionId is required".to_string()))?;

    let response = billing
        .subscriptions
        .cancel_subscription(auth_user.user_id, &subscription_id)
        .await?;

    Ok(Json(response))
}

/// Current subscription state for the caller
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let billing = state.billing()?;
    let summary = billing.subscriptions.get_subscription(auth_user.user_id).await?;
    Ok(Json(summary))
}
