//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use practice_shared::UserId;

use super::jwt::JwtError;
use crate::{error::ApiError, state::AppState};

/// Authenticated caller extracted from a Supabase bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// Extract bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, ApiError> {
    let claims = state
        .jwt_manager
        .validate_supabase_token(token)
        .map_err(|e| {
            match &e {
                JwtError::Expired => tracing::debug!("Rejected expired token"),
                other => tracing::warn!(error = %other, "Rejected bearer token"),
            }
            ApiError::InvalidToken
        })?;

    let user_id = claims.sub.parse::<UserId>().map_err(|_| {
        tracing::warn!(sub = %claims.sub, "Token subject is not a UUID");
        ApiError::InvalidToken
    })?;

    Ok(AuthUser { user_id })
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let auth_result = match extract_bearer_token(&request) {
        Some(token) => authenticate(&state, token),
        None => Err(ApiError::Unauthorized),
    };

    match auth_result {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}
