pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::auth::handlers as auth;
use crate::comments::handlers as comments;
use crate::pdfs::handlers as pdfs;
use crate::review::handlers as review;
use crate::state::AppState;

/// Room for multipart framing around the file part.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/v1/auth/github", get(auth::handle_github_sign_in))
        .route("/api/v1/auth/session", post(auth::handle_create_session))
        .route("/api/v1/auth/me", get(auth::handle_me))
        // Owner document management
        .route(
            "/api/v1/pdfs",
            get(pdfs::handle_list_pdfs).post(pdfs::handle_upload),
        )
        .route(
            "/api/v1/pdfs/:id",
            put(pdfs::handle_replace).delete(pdfs::handle_delete),
        )
        // Share-token review
        .route("/api/v1/share/:token", get(review::handle_get_review))
        .route(
            "/api/v1/share/:token/comments",
            get(comments::handle_list_comments).post(comments::handle_create_comment),
        )
        .route("/api/v1/share/:token/pins", get(review::handle_page_pins))
        .route("/api/v1/share/:token/live", get(review::handle_live))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
