//! Backend collaborator: rows, objects, realtime change feed and identity.
//!
//! Every service receives a [`Backend`] explicitly; nothing here is a global.

pub mod error;
pub mod identity;
#[cfg(test)]
pub mod memory;
pub mod realtime;
pub mod rows;
pub mod storage;

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

pub use error::BackendError;
pub use identity::{
    session_from_tokens, AuthEvent, GoTrueIdentity, IdentityProvider, OAuthProvider,
};
pub use realtime::{
    BroadcastFeed, ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, ChangeStream, RedisChangeFeed,
    StreamItem,
};
pub use rows::{PgRowStore, RowStore};
pub use storage::{ObjectStore, S3ObjectStore};

use crate::models::{Comment, NewComment};

pub const COMMENTS_TABLE: &str = "comments";

#[derive(Clone)]
pub struct Backend {
    pub rows: Arc<dyn RowStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub changes: Arc<dyn ChangeFeed>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl Backend {
    /// Inserts a comment row and emits the matching change event, the way a
    /// database-level change feed would.
    pub async fn insert_comment(&self, comment: NewComment) -> Result<Comment, BackendError> {
        let row = self.rows.insert_comment(comment).await?;
        let event = ChangeEvent::insert(COMMENTS_TABLE, &row)?;
        if let Err(e) = self.changes.publish(event).await {
            // The row is committed; subscribers will converge on the next event.
            warn!("Failed to publish insert for comment {}: {e}", row.id);
        }
        Ok(row)
    }

    /// Filter for new comments on one document.
    pub fn comment_inserts(pdf_id: Uuid) -> ChangeFilter {
        ChangeFilter::inserts_where(COMMENTS_TABLE, "pdf_id", pdf_id)
    }
}
