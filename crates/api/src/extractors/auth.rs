use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use bson::oid::ObjectId;

use crate::{error::ApiError, state::AppState};

/// Authenticated caller, resolved from the `Authorization: Bearer` header.
/// Session management itself is out of scope; this only needs a verified
/// user id per request.
pub struct AuthUser {
    pub user_id: ObjectId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Expected a bearer token".to_string()))?;

        let claims = state.auth.verify_access_token(token)?;
        let user_id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid subject in token".to_string()))?;

        Ok(AuthUser { user_id })
    }
}
