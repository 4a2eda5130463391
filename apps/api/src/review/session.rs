//! Controller behind the review page.
//!
//! Owns page/zoom state and the pin-placement mode, re-renders on every page or zoom
//! change, and keeps an in-memory comment list that the realtime subscription
//! replaces wholesale whenever the document's comments change.
//!
//! Pin coordinates are stored in the pixel space of the viewport that was showing when
//! the pin was placed. They are not rescaled when zoom changes.

use std::sync::{Arc, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::comments::{CommentService, CommentSubscription};
use crate::errors::AppError;
use crate::models::{Comment, NewComment, PdfRecord};
use crate::review::pins::{pins_for_page, Pin};
use crate::review::render::{PdfDocument, PdfRenderer, Viewport};
use crate::review::zoom::{Zoom, ZoomBounds};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinDraft {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReviewMode {
    Idle,
    /// "Add comment" was pressed; the next click on the page places the pin.
    PlacingPin,
    /// Pin placed, comment form open.
    Composing(PinDraft),
}

pub struct ReviewSession {
    pdf: PdfRecord,
    document: Box<dyn PdfDocument>,
    comment_service: CommentService,
    comments: Arc<RwLock<Vec<Comment>>>,
    _live: CommentSubscription,
    mode: ReviewMode,
    page: u32,
    zoom: Zoom,
    viewport: Option<Viewport>,
    active: Option<Uuid>,
}

impl ReviewSession {
    /// Opens the document, loads its comments, starts following realtime changes and
    /// renders page 1.
    pub async fn open(
        pdf: PdfRecord,
        pdf_url: &str,
        renderer: &dyn PdfRenderer,
        comment_service: CommentService,
        zoom: ZoomBounds,
    ) -> Result<Self, AppError> {
        let zoom = Zoom::new(zoom)?;
        let document = renderer.open(pdf_url).await?;

        let comments = Arc::new(RwLock::new(Vec::new()));
        let sink = comments.clone();
        let live = comment_service.subscribe_to_comments(pdf.id, move |latest| {
            *sink.write().unwrap_or_else(|e| e.into_inner()) = latest.to_vec();
        });

        let initial = comment_service.get_comments_by_pdf_id(pdf.id).await?;
        {
            let mut current = comments.write().unwrap_or_else(|e| e.into_inner());
            // Comments only grow while the document exists; a realtime refresh that
            // landed during the initial fetch is at least as fresh.
            if initial.len() >= current.len() {
                *current = initial;
            }
        }

        let mut session = Self {
            pdf,
            document,
            comment_service,
            comments,
            _live: live,
            mode: ReviewMode::Idle,
            page: 1,
            zoom,
            viewport: None,
            active: None,
        };
        session.render_at(1, zoom.factor()).await?;
        Ok(session)
    }

    pub fn pdf(&self) -> &PdfRecord {
        &self.pdf
    }

    pub fn mode(&self) -> ReviewMode {
        self.mode
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom.factor()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn active_comment(&self) -> Option<Uuid> {
        self.active
    }

    /// Snapshot of all comments, oldest first. This is also the sidebar order.
    pub fn comments(&self) -> Vec<Comment> {
        self.comments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Overlay for the current page.
    pub fn visible_pins(&self) -> Vec<Pin> {
        let comments = self.comments.read().unwrap_or_else(|e| e.into_inner());
        pins_for_page(&comments, self.page, self.active)
    }

    /// Returns whether the page changed (and was re-rendered). On a render error the
    /// session stays on the previous page.
    pub async fn go_to_page(&mut self, page: u32) -> Result<bool, AppError> {
        if page < 1 || page > self.page_count() || page == self.page {
            return Ok(false);
        }
        self.render_at(page, self.zoom.factor()).await?;
        self.page = page;
        Ok(true)
    }

    pub async fn next_page(&mut self) -> Result<bool, AppError> {
        self.go_to_page(self.page + 1).await
    }

    pub async fn previous_page(&mut self) -> Result<bool, AppError> {
        self.go_to_page(self.page.saturating_sub(1)).await
    }

    pub async fn zoom_in(&mut self) -> Result<bool, AppError> {
        let mut next = self.zoom;
        if !next.zoom_in() {
            return Ok(false);
        }
        self.apply_zoom(next).await
    }

    pub async fn zoom_out(&mut self) -> Result<bool, AppError> {
        let mut next = self.zoom;
        if !next.zoom_out() {
            return Ok(false);
        }
        self.apply_zoom(next).await
    }

    async fn apply_zoom(&mut self, next: Zoom) -> Result<bool, AppError> {
        self.render_at(self.page, next.factor()).await?;
        self.zoom = next;
        Ok(true)
    }

    pub fn begin_comment(&mut self) -> bool {
        if self.mode != ReviewMode::Idle {
            return false;
        }
        self.mode = ReviewMode::PlacingPin;
        true
    }

    /// A click on the rendered page. Only meaningful while placing a pin.
    pub fn place_pin(&mut self, x: f64, y: f64) -> bool {
        if self.mode != ReviewMode::PlacingPin {
            return false;
        }
        self.mode = ReviewMode::Composing(PinDraft {
            page: self.page,
            x,
            y,
        });
        true
    }

    pub fn cancel_comment(&mut self) {
        self.mode = ReviewMode::Idle;
    }

    /// Saves the comment for the placed pin. Empty text is rejected without a backend
    /// call, and on any error the form stays open.
    pub async fn submit_comment(
        &mut self,
        body: &str,
        author_name: Option<&str>,
    ) -> Result<Comment, AppError> {
        let ReviewMode::Composing(draft) = self.mode else {
            return Err(AppError::Validation(
                "Place a pin on the page before writing a comment".to_string(),
            ));
        };
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("Comment cannot be empty".to_string()));
        }

        let comment = self
            .comment_service
            .create_comment(NewComment {
                pdf_id: self.pdf.id,
                x: draft.x,
                y: draft.y,
                page_number: draft.page as i32,
                body: body.to_string(),
                author_name: author_name
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from),
            })
            .await?;

        self.mode = ReviewMode::Idle;
        Ok(comment)
    }

    /// Highlights a comment (pin or sidebar click), switching pages if it lives elsewhere.
    pub async fn select_comment(&mut self, comment_id: Uuid) -> Result<(), AppError> {
        let page = self
            .comments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|c| c.id == comment_id)
            .map(|c| c.page_number)
            .ok_or_else(|| AppError::NotFound(format!("Comment {comment_id} not found")))?;

        if let Ok(page) = u32::try_from(page) {
            self.go_to_page(page).await?;
        }
        self.active = Some(comment_id);
        Ok(())
    }

    /// Renders without touching page or zoom state; callers commit those on success.
    async fn render_at(&mut self, page_number: u32, scale: f64) -> Result<(), AppError> {
        let page = self.document.page(page_number).await?;
        let viewport = page.viewport(scale);
        page.render(&viewport).await?;
        debug!(
            "Rendered pdf {} page {page_number} at {scale:.2}x",
            self.pdf.id
        );
        self.viewport = Some(viewport);
        Ok(())
    }
}
