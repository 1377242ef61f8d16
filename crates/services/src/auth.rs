use bson::oid::ObjectId;
use chrono::{Duration, Utc};
use hirewire_config::AuthSettings;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id hex.
    pub sub: String,
    pub exp: usize,
}

/// HS256 access-token seam. Full session management is owned elsewhere;
/// this core only needs an authenticated user id per request/connection.
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_minutes: i64,
}

impl AuthService {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            ttl_minutes: settings.access_token_ttl_minutes,
        }
    }

    pub fn issue_access_token(&self, user_id: ObjectId) -> Result<String, AuthError> {
        let exp = Utc::now() + Duration::minutes(self.ttl_minutes);
        let claims = Claims {
            sub: user_id.to_hex(),
            exp: exp.timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}
