use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A positional reviewer comment. `x`/`y` are pixel offsets on the page as it was
/// rendered when the comment was placed; `page_number` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub pdf_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub page_number: i32,
    pub body: String,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub pdf_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub page_number: i32,
    pub body: String,
    pub author_name: Option<String>,
}
