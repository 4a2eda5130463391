use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::backend::BackendError;
use crate::models::{Comment, NewComment, NewPdf, PdfRecord};

/// Relational rows held by the backend: documents and their comments.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert_pdf(&self, pdf: NewPdf) -> Result<PdfRecord, BackendError>;

    async fn get_pdf(&self, id: Uuid) -> Result<Option<PdfRecord>, BackendError>;

    async fn get_pdf_by_share_token(&self, token: &str)
        -> Result<Option<PdfRecord>, BackendError>;

    /// Newest first.
    async fn list_pdfs_by_owner(&self, owner_id: Uuid) -> Result<Vec<PdfRecord>, BackendError>;

    /// Deletes the row and, by cascade, its comments. Returns whether a row existed.
    async fn delete_pdf(&self, id: Uuid) -> Result<bool, BackendError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, BackendError>;

    /// Oldest first; comments created at the same instant keep insertion order.
    async fn list_comments(&self, pdf_id: Uuid) -> Result<Vec<Comment>, BackendError>;
}

/// Postgres-backed row store.
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn insert_pdf(&self, pdf: NewPdf) -> Result<PdfRecord, BackendError> {
        let record = sqlx::query_as::<_, PdfRecord>(
            r#"
            INSERT INTO pdfs (owner_id, filename, storage_path, share_token)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(pdf.owner_id)
        .bind(&pdf.filename)
        .bind(&pdf.storage_path)
        .bind(&pdf.share_token)
        .fetch_one(&self.pool)
        .await?;

        info!("Inserted pdf {} for owner {}", record.id, record.owner_id);
        Ok(record)
    }

    async fn get_pdf(&self, id: Uuid) -> Result<Option<PdfRecord>, BackendError> {
        Ok(
            sqlx::query_as::<_, PdfRecord>("SELECT * FROM pdfs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_pdf_by_share_token(
        &self,
        token: &str,
    ) -> Result<Option<PdfRecord>, BackendError> {
        Ok(
            sqlx::query_as::<_, PdfRecord>("SELECT * FROM pdfs WHERE share_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_pdfs_by_owner(&self, owner_id: Uuid) -> Result<Vec<PdfRecord>, BackendError> {
        Ok(sqlx::query_as::<_, PdfRecord>(
            "SELECT * FROM pdfs WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_pdf(&self, id: Uuid) -> Result<bool, BackendError> {
        let result = sqlx::query("DELETE FROM pdfs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, BackendError> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (pdf_id, x, y, page_number, body, author_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(comment.pdf_id)
        .bind(comment.x)
        .bind(comment.y)
        .bind(comment.page_number)
        .bind(&comment.body)
        .bind(&comment.author_name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_comments(&self, pdf_id: Uuid) -> Result<Vec<Comment>, BackendError> {
        Ok(sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments WHERE pdf_id = $1 ORDER BY created_at ASC, seq ASC",
        )
        .bind(pdf_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
