use thiserror::Error;

use crate::errors::AppError;

pub const PDF_MIME: &str = "application/pdf";
pub const MAX_PDF_BYTES: usize = 5 * 1024 * 1024;
const PDF_SIGNATURE: &[u8] = b"%PDF-";
const MAX_FILENAME_CHARS: usize = 255;
const FALLBACK_FILENAME: &str = "resume.pdf";

/// Why a candidate upload was refused. Display strings are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdfRejection {
    #[error("Please select a PDF file")]
    NotPdf,

    #[error("File size must be {} or less", format_limit(*max_bytes))]
    TooLarge { max_bytes: usize },

    #[error("The selected file is empty")]
    Empty,

    #[error("The file does not look like a PDF document")]
    BadSignature,
}

impl From<PdfRejection> for AppError {
    fn from(r: PdfRejection) -> Self {
        match r {
            PdfRejection::NotPdf => AppError::UnsupportedMediaType(r.to_string()),
            PdfRejection::TooLarge { .. } => AppError::PayloadTooLarge(r.to_string()),
            PdfRejection::Empty | PdfRejection::BadSignature => AppError::Validation(r.to_string()),
        }
    }
}

/// Human form of a byte limit, rounded down so the message never overstates it.
fn format_limit(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}

fn is_pdf_mime(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|m| m.trim().eq_ignore_ascii_case(PDF_MIME))
        .unwrap_or(false)
}

/// Checks what is known before the bytes are read: declared type and size.
pub fn check_pdf_metadata(
    content_type: &str,
    size: usize,
    max_bytes: usize,
) -> Result<(), PdfRejection> {
    if !is_pdf_mime(content_type) {
        return Err(PdfRejection::NotPdf);
    }
    if size == 0 {
        return Err(PdfRejection::Empty);
    }
    if size > max_bytes {
        return Err(PdfRejection::TooLarge { max_bytes });
    }
    Ok(())
}

/// Full server-side check of an uploaded body.
pub fn check_pdf_upload(
    content_type: &str,
    body: &[u8],
    max_bytes: usize,
) -> Result<(), PdfRejection> {
    check_pdf_metadata(content_type, body.len(), max_bytes)?;
    if !body.starts_with(PDF_SIGNATURE) {
        return Err(PdfRejection::BadSignature);
    }
    Ok(())
}

/// Strips directories and control characters from a client-supplied filename.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// A file picked in the upload form, before any bytes leave the client.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCandidate {
    pub name: String,
    pub mime_type: String,
    pub size: usize,
}

/// Upload-form selection state. A rejected candidate never replaces the current one.
/// Obtain one from [`PdfService::upload_selection`](crate::pdfs::PdfService::upload_selection)
/// so the form enforces the same limit as the server.
#[derive(Debug)]
pub struct UploadSelection {
    max_bytes: usize,
    selected: Option<FileCandidate>,
    error: Option<String>,
}

impl UploadSelection {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            selected: None,
            error: None,
        }
    }

    pub fn select(&mut self, candidate: FileCandidate) -> Result<(), PdfRejection> {
        match check_pdf_metadata(&candidate.mime_type, candidate.size, self.max_bytes) {
            Ok(()) => {
                self.selected = Some(candidate);
                self.error = None;
                Ok(())
            }
            Err(rejection) => {
                self.error = Some(rejection.to_string());
                Err(rejection)
            }
        }
    }

    pub fn selected(&self) -> Option<&FileCandidate> {
        self.selected.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
