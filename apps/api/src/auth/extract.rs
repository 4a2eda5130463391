use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::errors::{AppError, BackendContext};
use crate::models::AuthUser;
use crate::state::AppState;

/// The user behind the request's `Authorization: Bearer <token>` header.
/// Rejects with 401 when the header is missing or the provider does not know the token.
pub struct CurrentUser(pub AuthUser);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let user = state
            .backend
            .identity
            .user_for_token(token)
            .await
            .during("verify session")?
            .ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser(user))
    }
}
