//! Axum route handlers for document upload and owner management.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::PdfRecord;
use crate::pdfs::service::{PdfUpload, PdfView};
use crate::state::AppState;

const FILE_FIELD: &str = "file";

/// Looks up the document behind a share token, or 404.
pub async fn resolve_share_token(state: &AppState, token: &str) -> Result<PdfRecord, AppError> {
    state
        .pdfs
        .get_pdf_by_share_token(token)
        .await?
        .ok_or_else(|| AppError::NotFound("Shared document not found".to_string()))
}

/// Pulls the `file` part out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<PdfUpload, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let body: Bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(PdfUpload {
            filename,
            content_type,
            body,
        });
    }
    Err(AppError::Validation(format!(
        "Multipart field '{FILE_FIELD}' is required"
    )))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(e.body_text())
    }
}

/// POST /api/v1/pdfs
pub async fn handle_upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PdfView>), AppError> {
    let upload = read_upload(multipart).await?;
    let record = state.pdfs.upload_pdf(user.id, upload).await?;
    Ok((StatusCode::CREATED, Json(state.pdfs.view(record))))
}

/// GET /api/v1/pdfs
pub async fn handle_list_pdfs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<PdfView>>, AppError> {
    let records = state.pdfs.get_user_pdfs(user.id).await?;
    Ok(Json(
        records.into_iter().map(|r| state.pdfs.view(r)).collect(),
    ))
}

/// PUT /api/v1/pdfs/:id
///
/// Replaces the file. Existing comments are dropped; the share link is kept.
pub async fn handle_replace(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<PdfView>, AppError> {
    let upload = read_upload(multipart).await?;
    let record = state.pdfs.replace_pdf(user.id, id, upload).await?;
    Ok(Json(state.pdfs.view(record)))
}

/// DELETE /api/v1/pdfs/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.pdfs.delete_pdf(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
