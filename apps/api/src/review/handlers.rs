//! Share-token endpoints backing the review page.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::comments::CommentService;
use crate::errors::AppError;
use crate::models::Comment;
use crate::pdfs::handlers::resolve_share_token;
use crate::review::pins::{pins_for_page, Pin};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub pdf_id: Uuid,
    pub filename: String,
    pub pdf_url: String,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
pub struct PinQuery {
    pub page: u32,
    pub active: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PinOverlay {
    pub page: u32,
    pub pins: Vec<Pin>,
}

/// Frames pushed over the live websocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum LiveFrame<'a> {
    Comments(&'a [Comment]),
}

/// GET /api/v1/share/:token
pub async fn handle_get_review(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ReviewResponse>, AppError> {
    let pdf = resolve_share_token(&state, &token).await?;
    let comments = state.comments.get_comments_by_pdf_id(pdf.id).await?;
    Ok(Json(ReviewResponse {
        pdf_id: pdf.id,
        pdf_url: state.pdfs.public_url(&pdf),
        filename: pdf.filename,
        created_at: pdf.created_at,
        comments,
    }))
}

/// GET /api/v1/share/:token/pins?page=N&active=<comment id>
pub async fn handle_page_pins(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<PinQuery>,
) -> Result<Json<PinOverlay>, AppError> {
    if query.page < 1 {
        return Err(AppError::Validation("page must be >= 1".to_string()));
    }
    let pdf = resolve_share_token(&state, &token).await?;
    let comments = state.comments.get_comments_by_pdf_id(pdf.id).await?;
    Ok(Json(PinOverlay {
        page: query.page,
        pins: pins_for_page(&comments, query.page, query.active),
    }))
}

/// GET /api/v1/share/:token/live
///
/// Websocket that sends the full comment list on connect and again after every change.
pub async fn handle_live(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let pdf = resolve_share_token(&state, &token).await?;
    let comments = state.comments.clone();
    Ok(ws.on_upgrade(move |socket| stream_comments(socket, comments, pdf.id)))
}

async fn send_comments(
    sender: &mut SplitSink<WebSocket, Message>,
    comments: &[Comment],
) -> Result<(), ()> {
    let text = serde_json::to_string(&LiveFrame::Comments(comments)).map_err(|e| {
        warn!("Failed to encode comment frame: {e}");
    })?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

async fn stream_comments(socket: WebSocket, comments: CommentService, pdf_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Comment>>();
    let _subscription = comments.subscribe_to_comments(pdf_id, move |latest| {
        let _ = tx.send(latest.to_vec());
    });

    match comments.get_comments_by_pdf_id(pdf_id).await {
        Ok(initial) => {
            if send_comments(&mut sender, &initial).await.is_err() {
                return;
            }
        }
        Err(e) => {
            warn!("Live stream for pdf {pdf_id} could not load comments: {e}");
            return;
        }
    }

    info!("Live comment stream opened for pdf {pdf_id}");
    loop {
        tokio::select! {
            Some(latest) = rx.recv() => {
                if send_comments(&mut sender, &latest).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("Live comment stream closed for pdf {pdf_id}");
}
