use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PdfRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub share_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row to insert for a freshly uploaded (or replaced) document.
#[derive(Debug, Clone)]
pub struct NewPdf {
    pub owner_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub share_token: String,
}
