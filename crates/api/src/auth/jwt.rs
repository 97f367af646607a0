//! Supabase access token validation

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims structure for Supabase-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    /// Subject (user ID as string, parsed to a UUID by the middleware)
    pub sub: String,
    pub email: Option<String>,
    /// Role (authenticated, anon, etc.)
    pub role: Option<String>,
    pub aud: Option<String>,
    pub iat: Option<i64>,
    pub exp: i64,
}

/// Validates bearer tokens issued by Supabase Auth
#[derive(Clone)]
pub struct JwtManager {
    supabase_decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(supabase_secret: &str) -> Self {
        Self {
            supabase_decoding_key: DecodingKey::from_secret(supabase_secret.as_bytes()),
        }
    }

    /// Validate a Supabase-issued JWT token.
    /// Only HS256 with the `authenticated` audience is accepted.
    pub fn validate_supabase_token(&self, token: &str) -> Result<SupabaseClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance
        validation.set_audience(&["authenticated"]);

        match decode::<SupabaseClaims>(token, &self.supabase_decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(JwtError::Expired),
                jsonwebtoken::errors::ErrorKind::InvalidToken => Err(JwtError::Invalid),
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Err(JwtError::Invalid),
                jsonwebtoken::errors::ErrorKind::InvalidSignature => Err(JwtError::Invalid),
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    tracing::warn!("Supabase JWT audience validation failed - rejecting token");
                    Err(JwtError::Invalid)
                }
                _ => Err(JwtError::Validation(e.to_string())),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token validation failed: {0}")]
    Validation(String),
}

/// Mint a Supabase-shaped token for tests
#[cfg(test)]
pub(crate) fn sign_test_token(
    secret: &str,
    sub: &str,
    email: &str,
    aud: &str,
    exp_offset_secs: i64,
) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::OffsetDateTime;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = SupabaseClaims {
        sub: sub.to_string(),
        email: Some(email.to_string()),
        role: Some("authenticated".to_string()),
        aud: Some(aud.to_string()),
        iat: Some(now),
        exp: now + exp_offset_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const SECRET: &str = "test-supabase-secret-at-least-32-characters";

    #[test]
    fn test_valid_supabase_token() {
        let jwt = JwtManager::new(SECRET);
        let user_id = Uuid::new_v4().to_string();
        let token = sign_test_token(SECRET, &user_id, "t@example.com", "authenticated", 3600);

        let claims = jwt.validate_supabase_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email.as_deref(), Some("t@example.com"));
    }

    #[test]
    fn test_rejects_wrong_audience_secret_and_expiry() {
        let jwt = JwtManager::new(SECRET);
        let sub = Uuid::new_v4().to_string();

        let anon = sign_test_token(SECRET, &sub, "t@example.com", "anon", 3600);
        assert!(matches!(jwt.validate_supabase_token(&anon), Err(JwtError::Invalid)));

        let forged = sign_test_token(
            "another-secret-that-is-also-long-enough",
            &sub,
            "t@example.com",
            "authenticated",
            3600,
        );
        assert!(matches!(jwt.validate_supabase_token(&forged), Err(JwtError::Invalid)));

        let expired = sign_test_token(SECRET, &sub, "t@example.com", "authenticated", -3600);
        assert!(matches!(jwt.validate_supabase_token(&expired), Err(JwtError::Expired)));

        assert!(jwt.validate_supabase_token("not-a-jwt").is_err());
    }
}
