//! Seam to the external PDF rendering library.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::errors::AppError;

/// Pixel size of a page at a given scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to open document: {0}")]
    Open(String),

    #[error("page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        AppError::Render(e.to_string())
    }
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn PdfDocument>, RenderError>;
}

#[async_trait]
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> u32;

    /// `number` is 1-based.
    async fn page(&self, number: u32) -> Result<Box<dyn PdfPage>, RenderError>;
}

#[async_trait]
pub trait PdfPage: Send + Sync {
    fn viewport(&self, scale: f64) -> Viewport;

    /// Draws the page onto the document's surface, replacing what was there.
    async fn render(&self, viewport: &Viewport) -> Result<(), RenderError>;
}
