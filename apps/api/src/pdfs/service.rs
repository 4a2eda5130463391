use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::errors::{AppError, BackendContext};
use crate::models::{NewPdf, PdfRecord};
use crate::pdfs::share::{generate_share_token, share_url};
use crate::pdfs::validation::{check_pdf_upload, sanitize_filename, UploadSelection, PDF_MIME};

/// A file received from the owner, not yet validated.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

/// A document record together with the links the owner needs.
#[derive(Debug, Clone, Serialize)]
pub struct PdfView {
    #[serde(flatten)]
    pub record: PdfRecord,
    pub public_url: String,
    pub share_url: String,
}

/// Document CRUD over the backend: object upload, row bookkeeping, share links.
#[derive(Clone)]
pub struct PdfService {
    backend: Backend,
    app_base_url: String,
    max_upload_bytes: usize,
}

impl PdfService {
    pub fn new(backend: Backend, app_base_url: String, max_upload_bytes: usize) -> Self {
        Self {
            backend,
            app_base_url,
            max_upload_bytes,
        }
    }

    pub async fn upload_pdf(&self, owner_id: Uuid, upload: PdfUpload) -> Result<PdfRecord, AppError> {
        check_pdf_upload(&upload.content_type, &upload.body, self.max_upload_bytes)?;
        let filename = sanitize_filename(&upload.filename);

        let storage_path = storage_path_for(owner_id);
        self.backend
            .objects
            .upload(&storage_path, upload.body, PDF_MIME)
            .await
            .during("upload file")?;

        let row = NewPdf {
            owner_id,
            filename,
            storage_path: storage_path.clone(),
            share_token: generate_share_token(),
        };
        match self.backend.rows.insert_pdf(row).await {
            Ok(record) => {
                info!("Uploaded pdf {} ({}) for {owner_id}", record.id, record.filename);
                Ok(record)
            }
            Err(e) => {
                self.remove_object_quietly(&storage_path).await;
                Err(AppError::Backend {
                    action: "save PDF record",
                    source: e,
                })
            }
        }
    }

    /// `Ok(None)` when no document carries this token.
    pub async fn get_pdf_by_share_token(&self, token: &str) -> Result<Option<PdfRecord>, AppError> {
        self.backend
            .rows
            .get_pdf_by_share_token(token)
            .await
            .during("fetch PDF")
    }

    pub async fn get_user_pdfs(&self, owner_id: Uuid) -> Result<Vec<PdfRecord>, AppError> {
        self.backend
            .rows
            .list_pdfs_by_owner(owner_id)
            .await
            .during("fetch PDFs")
    }

    /// Swaps the file behind a document. The old row is deleted (taking its comments with
    /// it) and a new row is inserted under the same share token, so shared links survive.
    pub async fn replace_pdf(
        &self,
        owner_id: Uuid,
        pdf_id: Uuid,
        upload: PdfUpload,
    ) -> Result<PdfRecord, AppError> {
        check_pdf_upload(&upload.content_type, &upload.body, self.max_upload_bytes)?;
        let existing = self.owned_pdf(owner_id, pdf_id).await?;
        let filename = sanitize_filename(&upload.filename);

        let storage_path = storage_path_for(owner_id);
        self.backend
            .objects
            .upload(&storage_path, upload.body, PDF_MIME)
            .await
            .during("upload file")?;

        if let Err(e) = self.backend.rows.delete_pdf(existing.id).await {
            self.remove_object_quietly(&storage_path).await;
            return Err(AppError::Backend {
                action: "delete previous PDF record",
                source: e,
            });
        }

        let row = NewPdf {
            owner_id,
            filename,
            storage_path: storage_path.clone(),
            share_token: existing.share_token.clone(),
        };
        let record = match self.backend.rows.insert_pdf(row).await {
            Ok(record) => record,
            Err(e) => {
                self.remove_object_quietly(&storage_path).await;
                return Err(AppError::Backend {
                    action: "save PDF record",
                    source: e,
                });
            }
        };

        self.remove_object_quietly(&existing.storage_path).await;
        info!("Replaced pdf {} with {}", existing.id, record.id);
        Ok(record)
    }

    /// Deletes the row first; a failure to remove the stored object afterwards is
    /// logged and ignored, which may leave an orphaned object behind.
    pub async fn delete_pdf(&self, owner_id: Uuid, pdf_id: Uuid) -> Result<(), AppError> {
        let existing = self.owned_pdf(owner_id, pdf_id).await?;

        let deleted = self
            .backend
            .rows
            .delete_pdf(existing.id)
            .await
            .during("delete PDF")?;
        if !deleted {
            return Err(AppError::NotFound(format!("PDF {pdf_id} not found")));
        }

        self.remove_object_quietly(&existing.storage_path).await;
        info!("Deleted pdf {pdf_id}");
        Ok(())
    }

    pub fn public_url(&self, record: &PdfRecord) -> String {
        self.backend.objects.public_url(&record.storage_path)
    }

    pub fn share_url(&self, record: &PdfRecord) -> String {
        share_url(&self.app_base_url, &record.share_token)
    }

    /// Upload-form state bound to the same limit this service enforces.
    pub fn upload_selection(&self) -> UploadSelection {
        UploadSelection::new(self.max_upload_bytes)
    }

    pub fn view(&self, record: PdfRecord) -> PdfView {
        PdfView {
            public_url: self.public_url(&record),
            share_url: self.share_url(&record),
            record,
        }
    }

    async fn owned_pdf(&self, owner_id: Uuid, pdf_id: Uuid) -> Result<PdfRecord, AppError> {
        let record = self
            .backend
            .rows
            .get_pdf(pdf_id)
            .await
            .during("fetch PDF")?
            .ok_or_else(|| AppError::NotFound(format!("PDF {pdf_id} not found")))?;
        if record.owner_id != owner_id {
            return Err(AppError::Forbidden);
        }
        Ok(record)
    }

    async fn remove_object_quietly(&self, path: &str) {
        if let Err(e) = self.backend.objects.remove(path).await {
            warn!("Failed to remove stored object {path}: {e}");
        }
    }
}

fn storage_path_for(owner_id: Uuid) -> String {
    format!("{owner_id}/{}.pdf", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{test_backend, TestBackend};
    use crate::models::NewComment;
    use crate::pdfs::validation::{FileCandidate, MAX_PDF_BYTES};

    fn service(tb: &TestBackend) -> PdfService {
        PdfService::new(
            tb.backend.clone(),
            "https://redline.test".into(),
            MAX_PDF_BYTES,
        )
    }

    fn pdf(name: &str) -> PdfUpload {
        PdfUpload {
            filename: name.to_string(),
            content_type: "application/pdf".into(),
            body: Bytes::from_static(b"%PDF-1.4\n%fake\n"),
        }
    }

    fn comment_on(pdf_id: Uuid) -> NewComment {
        NewComment {
            pdf_id,
            x: 10.0,
            y: 20.0,
            page_number: 1,
            body: "tighten this".into(),
            author_name: None,
        }
    }

    #[tokio::test]
    async fn test_upload_selection_uses_configured_limit() {
        let tb = test_backend();
        let svc = PdfService::new(tb.backend.clone(), "https://redline.test".into(), 256 * 1024);
        let mut selection = svc.upload_selection();

        let oversized = FileCandidate {
            name: "cv.pdf".into(),
            mime_type: "application/pdf".into(),
            size: 300 * 1024,
        };
        assert!(selection.select(oversized).is_err());
        assert_eq!(selection.error(), Some("File size must be 256 KB or less"));

        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.resize(300 * 1024, 0);
        let big_body = PdfUpload {
            body: Bytes::from(bytes),
            ..pdf("cv.pdf")
        };
        let err = svc.upload_pdf(Uuid::new_v4(), big_body).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn test_upload_stores_object_and_row() {
        let tb = test_backend();
        let svc = service(&tb);
        let owner = Uuid::new_v4();

        let record = svc.upload_pdf(owner, pdf("cv.pdf")).await.unwrap();

        assert_eq!(record.owner_id, owner);
        assert_eq!(record.filename, "cv.pdf");
        assert!(record.storage_path.starts_with(&owner.to_string()));
        assert!(tb.objects.contains(&record.storage_path));
        assert_eq!(
            svc.share_url(&record),
            format!("https://redline.test/review?token={}", record.share_token)
        );
        let found = svc
            .get_pdf_by_share_token(&record.share_token)
            .await
            .unwrap();
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_invalid_upload_never_reaches_storage() {
        let tb = test_backend();
        let svc = service(&tb);
        let mut upload = pdf("cv.txt");
        upload.content_type = "text/plain".into();

        let err = svc.upload_pdf(Uuid::new_v4(), upload).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType(_)));
        assert_eq!(tb.objects.object_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_prefixed() {
        let tb = test_backend();
        tb.objects.fail_uploads(true);
        let err = service(&tb)
            .upload_pdf(Uuid::new_v4(), pdf("cv.pdf"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to upload file:"));
    }

    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let tb = test_backend();
        assert!(service(&tb)
            .get_pdf_by_share_token("nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_user_pdfs_scoped_to_owner() {
        let tb = test_backend();
        let svc = service(&tb);
        let alice = Uuid::new_v4();
        svc.upload_pdf(alice, pdf("a.pdf")).await.unwrap();
        svc.upload_pdf(alice, pdf("b.pdf")).await.unwrap();
        svc.upload_pdf(Uuid::new_v4(), pdf("c.pdf")).await.unwrap();

        let mine = svc.get_user_pdfs(alice).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|p| p.owner_id == alice));
    }

    #[tokio::test]
    async fn test_delete_cascades_and_swallows_storage_failure() {
        let tb = test_backend();
        let svc = service(&tb);
        let owner = Uuid::new_v4();
        let record = svc.upload_pdf(owner, pdf("cv.pdf")).await.unwrap();
        tb.backend.insert_comment(comment_on(record.id)).await.unwrap();
        tb.objects.fail_removals(true);

        svc.delete_pdf(owner, record.id).await.unwrap();

        assert_eq!(tb.rows.comment_count(), 0);
        assert!(svc
            .get_pdf_by_share_token(&record.share_token)
            .await
            .unwrap()
            .is_none());
        // Orphaned object accepted.
        assert!(tb.objects.contains(&record.storage_path));
    }

    #[tokio::test]
    async fn test_delete_requires_ownership() {
        let tb = test_backend();
        let svc = service(&tb);
        let record = svc.upload_pdf(Uuid::new_v4(), pdf("cv.pdf")).await.unwrap();

        let err = svc.delete_pdf(Uuid::new_v4(), record.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let err = svc.delete_pdf(record.owner_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_replace_keeps_token_and_drops_comments() {
        let tb = test_backend();
        let svc = service(&tb);
        let owner = Uuid::new_v4();
        let original = svc.upload_pdf(owner, pdf("v1.pdf")).await.unwrap();
        tb.backend
            .insert_comment(comment_on(original.id))
            .await
            .unwrap();

        let replaced = svc
            .replace_pdf(owner, original.id, pdf("v2.pdf"))
            .await
            .unwrap();

        assert_ne!(replaced.id, original.id);
        assert_eq!(replaced.share_token, original.share_token);
        assert_eq!(replaced.filename, "v2.pdf");
        assert_eq!(tb.rows.comment_count(), 0);
        assert!(!tb.objects.contains(&original.storage_path));
        assert!(tb.objects.contains(&replaced.storage_path));
    }
}
