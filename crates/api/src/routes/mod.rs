//! API routes

pub mod billing;
pub mod health;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{auth::require_auth, state::AppState};

/// CORS policy for the billing endpoints. The webhook is called server to
/// server, and the browser only ever sends JSON with a bearer token.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Stripe authenticates itself with the signature header
    let public_billing_routes = Router::new().route("/billing/webhook", post(billing::webhook));

    let protected_billing_routes = Router::new()
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/cancel", post(billing::cancel_subscription))
        .route("/billing/subscription", get(billing::get_subscription))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_v1_routes = Router::new()
        .merge(public_billing_routes)
        .merge(protected_billing_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        // Legacy webhook path still configured in older Stripe dashboards
        .route("/webhook", post(billing::webhook))
        .layer(cors_layer())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use practice_billing::{
        signature::compute_signature, BillingGateway, BillingResult, BillingService,
        CheckoutParams, CheckoutSessionInfo, MemoryStore, PriceIds, ProcessingResult, StripeConfig,
    };
    use practice_shared::{SubscriptionStatus, UserBilling, UserId};
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::create_router;
    use crate::{auth::jwt::sign_test_token, config::Config, state::AppState};

    const JWT_SECRET: &str = "test-jwt-secret-that-is-at-least-32-chars";
    const WEBHOOK_SECRET: &str = "whsec_route_secret";

    #[derive(Default)]
    struct FakeGateway {
        customers_created: AtomicUsize,
        cancelled: AtomicUsize,
    }

    #[async_trait]
    impl BillingGateway for FakeGateway {
        async fn create_customer(&self, _email: &str, _user_id: UserId) -> BillingResult<String> {
            self.customers_created.fetch_add(1, Ordering::SeqCst);
            Ok("cus_fake".to_string())
        }

        async fn create_checkout_session(
            &self,
            params: CheckoutParams,
        ) -> BillingResult<CheckoutSessionInfo> {
            Ok(CheckoutSessionInfo {
                id: format!("cs_{}", params.period.as_str()),
                url: Some("https://checkout.stripe.test/session".to_string()),
            })
        }

        async fn cancel_subscription(&self, _subscription_id: &str) -> BillingResult<Option<i64>> {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            Ok(Some(1_700_000_000))
        }
    }

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
    }

    fn test_config(enable_billing: bool) -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            database_url: "postgres://localhost/practice_test".to_string(),
            database_max_connections: 1,
            run_migrations: false,
            supabase_jwt_secret: JWT_SECRET.to_string(),
            enable_billing,
            log_json: false,
        }
    }

    fn stripe_config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_fake".to_string(),
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            price_ids: PriceIds {
                monthly: "price_monthly".to_string(),
                annual: Some("price_annual".to_string()),
            },
            app_base_url: "https://app.example.com".to_string(),
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let billing = BillingService::new(stripe_config(), store.clone(), gateway.clone());
        let state = AppState::new(test_config(true), store.clone(), Some(Arc::new(billing)));
        Harness {
            app: create_router(state),
            store,
            gateway,
        }
    }

    fn bearer(user_id: UserId) -> String {
        let token = sign_test_token(
            JWT_SECRET,
            &user_id.to_string(),
            "therapist@example.com",
            "authenticated",
            3600,
        );
        format!("Bearer {}", token)
    }

    fn signed_webhook(uri: &str, payload: &str) -> Request<Body> {
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        let sig = compute_signature(payload, ts, WEBHOOK_SECRET).unwrap();
        Request::post(uri)
            .header("stripe-signature", format!("t={},v1={}", ts, sig))
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn seed_user(store: &MemoryStore) -> UserId {
        let user_id = UserId(Uuid::new_v4());
        store
            .insert_user(UserBilling::new_trial(user_id, "therapist@example.com"))
            .await;
        user_id
    }

    #[tokio::test]
    async fn test_liveness() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_without_signature_is_rejected() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/webhook")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "No Stripe signature found");
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_rejected() {
        let h = harness();
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/webhook")
                    .header("stripe-signature", format!("t={},v1={}", ts, "00".repeat(32)))
                    .body(Body::from(r#"{"id":"evt_1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Webhook Error:"));
        assert_eq!(h.store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_webhook_checkout_completed_activates_user() {
        let h = harness();
        let user_id = seed_user(&h.store).await;
        let payload = json!({
            "id": "evt_checkout_1",
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": {
                "object": {
                    "id": "cs_test",
                    "customer": "cus_abc",
                    "subscription": "sub_abc",
                    "metadata": {
                        "supabase_user_id": user_id.to_string(),
                        "subscription_period": "annual"
                    }
                }
            }
        })
        .to_string();

        let response = h
            .app
            .oneshot(signed_webhook("/api/v1/billing/webhook", &payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "received": true }));

        let user = h.store.user(user_id).await.unwrap();
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
        assert_eq!(user.stripe_subscription_id.as_deref(), Some("sub_abc"));
    }

    #[tokio::test]
    async fn test_legacy_webhook_path_acknowledges_unknown_events() {
        let h = harness();
        let payload = json!({
            "id": "evt_unknown",
            "type": "customer.updated",
            "created": 1_700_000_000,
            "data": { "object": {} }
        })
        .to_string();

        let response = h.app.oneshot(signed_webhook("/webhook", &payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_rejects_get() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::get("/api/v1/billing/webhook").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_checkout_requires_auth() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/checkout")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"priceId":"price_monthly"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_checkout_with_wrong_audience_is_rejected() {
        let h = harness();
        let user_id = seed_user(&h.store).await;
        let token = sign_test_token(JWT_SECRET, &user_id.to_string(), "a@b.c", "anon", 3600);

        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/checkout")
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"priceId":"price_monthly"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_checkout_returns_session() {
        let h = harness();
        let user_id = seed_user(&h.store).await;

        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/checkout")
                    .header("authorization", bearer(user_id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"priceId":"price_annual"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sessionId"], "cs_annual");
        assert_eq!(body["url"], "https://checkout.stripe.test/session");
        assert_eq!(h.gateway.customers_created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_checkout_missing_price_is_bad_request() {
        let h = harness();
        let user_id = seed_user(&h.store).await;

        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/checkout")
                    .header("authorization", bearer(user_id))
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.gateway.customers_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_checkout_malformed_json_is_bad_request() {
        let h = harness();
        let user_id = seed_user(&h.store).await;

        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/checkout")
                    .header("authorization", bearer(user_id))
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_foreign_subscription_is_forbidden() {
        let h = harness();
        let user_id = seed_user(&h.store).await;

        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/billing/cancel")
                    .header("authorization", bearer(user_id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"subscriptionId":"sub_someone_else"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Invalid subscription");
        assert_eq!(h.gateway.cancelled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscription_summary() {
        let h = harness();
        let user_id = seed_user(&h.store).await;

        let response = h
            .app
            .oneshot(
                Request::get("/api/v1/billing/subscription")
                    .header("authorization", bearer(user_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "trialing");
        assert_eq!(body["hasAccess"], true);
    }

    #[tokio::test]
    async fn test_billing_disabled_returns_service_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let app = create_router(AppState::new(test_config(false), store, None));
        let payload = r#"{"id":"evt_1","type":"invoice.paid","created":0,"data":{"object":{}}}"#;

        let response = app
            .oneshot(signed_webhook("/api/v1/billing/webhook", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_webhook_with_non_uuid_user_metadata_is_server_error() {
        let h = harness();
        let payload = json!({
            "id": "evt_bad_user",
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": {
                "object": {
                    "id": "cs_test",
                    "customer": "cus_abc",
                    "subscription": "sub_abc",
                    "metadata": { "supabase_user_id": "not-a-uuid" }
                }
            }
        })
        .to_string();

        let response = h
            .app
            .oneshot(signed_webhook("/api/v1/billing/webhook", &payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            h.store.ledger_result("evt_bad_user").await,
            Some(ProcessingResult::Error)
        );
    }

    #[tokio::test]
    async fn test_webhook_with_malformed_subscription_object_is_server_error() {
        let h = harness();
        let payload = json!({
            "id": "evt_no_status",
            "type": "customer.subscription.updated",
            "created": 1_700_000_000,
            "data": { "object": { "id": "sub_abc" } }
        })
        .to_string();

        let response = h
            .app
            .oneshot(signed_webhook("/api/v1/billing/webhook", &payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_signed_non_json_body_is_bad_request() {
        let h = harness();
        let response = h
            .app
            .oneshot(signed_webhook("/api/v1/billing/webhook", "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.store.ledger_len().await, 0);
    }
}
