use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Comment, NewComment};
use crate::pdfs::handlers::resolve_share_token;
use crate::state::AppState;

pub const MAX_COMMENT_CHARS: usize = 2000;
const MAX_AUTHOR_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub x: f64,
    pub y: f64,
    pub page_number: i32,
    pub body: String,
    pub author_name: Option<String>,
}

impl CreateCommentRequest {
    fn validate(self, pdf_id: uuid::Uuid) -> Result<NewComment, AppError> {
        let body = self.body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("Comment cannot be empty".to_string()));
        }
        if body.chars().count() > MAX_COMMENT_CHARS {
            return Err(AppError::Validation(format!(
                "Comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }
        if self.page_number < 1 {
            return Err(AppError::Validation("page_number must be >= 1".to_string()));
        }
        if !(self.x.is_finite() && self.y.is_finite()) || self.x < 0.0 || self.y < 0.0 {
            return Err(AppError::Validation(
                "Pin coordinates must be non-negative numbers".to_string(),
            ));
        }
        let author_name = self
            .author_name
            .map(|a| a.trim().chars().take(MAX_AUTHOR_CHARS).collect::<String>())
            .filter(|a| !a.is_empty());

        Ok(NewComment {
            pdf_id,
            x: self.x,
            y: self.y,
            page_number: self.page_number,
            body: body.to_string(),
            author_name,
        })
    }
}

/// GET /api/v1/share/:token/comments
pub async fn handle_list_comments(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let pdf = resolve_share_token(&state, &token).await?;
    let comments = state.comments.get_comments_by_pdf_id(pdf.id).await?;
    Ok(Json(comments))
}

/// POST /api/v1/share/:token/comments
///
/// Anonymous: holding the share token is enough to comment.
pub async fn handle_create_comment(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let pdf = resolve_share_token(&state, &token).await?;
    let params = req.validate(pdf.id)?;
    let comment = state.comments.create_comment(params).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
