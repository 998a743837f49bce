//! Session tokens
//!
//! HS256 JWTs carrying the account id and username.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clock skew tolerated when validating `exp` and `nbf`
const LEEWAY_SECS: u64 = 5;

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: Uuid,
    pub username: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Issues and validates session tokens
#[derive(Clone)]
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenManager {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Sign a token for the account
    pub fn issue(&self, account_id: Uuid, username: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id,
            username: username.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate signature, algorithm and time claims
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!(error = %e, "JWT validation failed");
                    TokenError::Invalid
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new("test-secret", 3600)
    }

    #[test]
    fn test_issue_and_validate() {
        let tokens = manager();
        let account_id = Uuid::new_v4();

        let token = tokens.issue(account_id, "alice").unwrap();
        let claims = tokens.validate(&token).unwrap();

        assert_eq!(claims.sub, account_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = manager().issue(Uuid::new_v4(), "alice").unwrap();
        let other = TokenManager::new("another-secret", 3600);
        assert_eq!(other.validate(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_expired_token_distinguished() {
        let tokens = manager();
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&Claims {
                sub: Uuid::new_v4(),
                username: "alice".to_string(),
                iat: now - 120,
                nbf: now - 120,
                exp: now - 60,
            })
            .unwrap();

        assert_eq!(tokens.validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_leeway_accepts_just_expired() {
        let tokens = manager();
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&Claims {
                sub: Uuid::new_v4(),
                username: "alice".to_string(),
                iat: now - 10,
                nbf: now - 10,
                exp: now - 2,
            })
            .unwrap();

        assert!(tokens.validate(&token).is_ok());
    }

    #[test]
    fn test_not_yet_valid_rejected() {
        let tokens = manager();
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&Claims {
                sub: Uuid::new_v4(),
                username: "alice".to_string(),
                iat: now,
                nbf: now + 600,
                exp: now + 1200,
            })
            .unwrap();

        assert_eq!(tokens.validate(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(manager().validate("not.a.jwt"), Err(TokenError::Invalid));
    }
}
