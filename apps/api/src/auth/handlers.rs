use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::backend::{session_from_tokens, OAuthProvider};
use crate::errors::{AppError, BackendContext};
use crate::models::{AuthUser, Session};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    pub redirect_to: Option<String>,
}

/// GET /api/v1/auth/github
///
/// Sends the browser to the identity provider. `redirect_to` must point back into the
/// app; it defaults to the upload page.
pub async fn handle_github_sign_in(
    State(state): State<AppState>,
    Query(query): Query<SignInQuery>,
) -> Result<Redirect, AppError> {
    let app_url = state.config.public_app_url.trim_end_matches('/');
    let redirect_to = match query.redirect_to {
        Some(target) if target == app_url || target.starts_with(&format!("{app_url}/")) => {
            target
        }
        Some(_) => {
            return Err(AppError::Validation(
                "redirect_to must point to this application".to_string(),
            ))
        }
        None => format!("{app_url}/upload"),
    };

    let url = state
        .backend
        .identity
        .sign_in_with_oauth(OAuthProvider::GitHub, &redirect_to)
        .await
        .during("start GitHub sign-in")?;
    Ok(Redirect::temporary(&url))
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// POST /api/v1/auth/session
///
/// OAuth callback: the app posts the tokens from the redirect and gets back a verified
/// session. The server keeps no per-user session; later calls send the bearer token.
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<Session>, AppError> {
    let access_token = req.access_token.trim().to_string();
    if access_token.is_empty() {
        return Err(AppError::Validation("access_token is required".to_string()));
    }
    let session = session_from_tokens(
        state.backend.identity.as_ref(),
        access_token,
        req.refresh_token,
    )
    .await
    .during("verify session")?
    .ok_or(AppError::Unauthorized)?;
    Ok(Json(session))
}

/// GET /api/v1/auth/me
pub async fn handle_me(CurrentUser(user): CurrentUser) -> Json<AuthUser> {
    Json(user)
}
