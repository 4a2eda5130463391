pub mod handlers;
pub mod service;
pub mod share;
pub mod validation;

pub use service::{PdfService, PdfUpload, PdfView};
