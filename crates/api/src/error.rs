//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use practice_billing::BillingError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid subscription")]
    InvalidSubscription,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Internal errors
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Database(String),
    #[error("{0}")]
    Configuration(String),
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::InvalidSubscription => (StatusCode::FORBIDDEN, "INVALID_SUBSCRIPTION"),

            // Validation
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),

            // Internal; messages are passed through unredacted
            ApiError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
            ApiError::ServiceUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
        };

        let message = match self {
            ApiError::Validation(msg) | ApiError::BadRequest(msg) => msg,
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::WebhookSignatureInvalid(reason) => {
                ApiError::BadRequest(format!("Webhook Error: {}", reason))
            }
            BillingError::WebhookPayload(msg) => {
                ApiError::BadRequest(format!("Webhook Error: {}", msg))
            }
            BillingError::InvalidInput(msg) => ApiError::Validation(msg),
            BillingError::SubscriptionMismatch => ApiError::InvalidSubscription,
            BillingError::UserNotFound(_) => ApiError::NotFound,
            BillingError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                ApiError::Database(msg)
            }
            BillingError::Config(msg) => {
                tracing::error!("Billing configuration error: {}", msg);
                ApiError::Configuration(msg)
            }
            err @ (BillingError::StripeApi(_)
            | BillingError::MissingField(_)
            | BillingError::EventData(_)) => {
                tracing::error!(error = %err, "Billing operation failed");
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn error_message(err: ApiError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, body["error"]["message"].as_str().unwrap().to_string())
    }

    #[test]
    fn test_billing_error_status_mapping() {
        let cases = [
            (BillingError::WebhookSignatureInvalid("signature mismatch"), StatusCode::BAD_REQUEST),
            (BillingError::WebhookPayload("expected value".into()), StatusCode::BAD_REQUEST),
            (BillingError::InvalidInput("priceId is required".into()), StatusCode::BAD_REQUEST),
            (BillingError::SubscriptionMismatch, StatusCode::FORBIDDEN),
            (BillingError::UserNotFound("x".into()), StatusCode::NOT_FOUND),
            (BillingError::StripeApi("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (BillingError::MissingField("subscription"), StatusCode::INTERNAL_SERVER_ERROR),
            (
                BillingError::EventData("missing field `status`".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                BillingError::Config("Webhook configuration error".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_database_error_message_is_passed_through() {
        let err = ApiError::from(BillingError::Database("relation users does not exist".into()));
        let (status, message) = error_message(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "relation users does not exist");
    }

    #[tokio::test]
    async fn test_event_data_error_is_server_error() {
        let err = ApiError::from(BillingError::EventData("invalid supabase_user_id".into()));
        let (status, message) = error_message(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("invalid supabase_user_id"));
    }
}
