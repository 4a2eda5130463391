//! Comment CRUD plus the per-document listener registry that fans realtime changes
//! out to subscribers.
//!
//! Each document with at least one listener owns exactly one upstream change
//! subscription. Every insert event triggers a full refetch of that document's
//! comments, and the whole list is handed to every listener. Nothing is merged
//! incrementally, so out-of-order or partial realtime payloads cannot corrupt what
//! listeners see; the cost is that a burst of inserts yields a burst of refetches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{Backend, ChangeStream, StreamItem};
use crate::errors::{AppError, BackendContext};
use crate::models::{Comment, NewComment};

/// Receives the complete, chronologically ordered comment list of one document.
pub type CommentListener = Arc<dyn Fn(&[Comment]) + Send + Sync>;

type ListenerId = u64;

struct Channel {
    listeners: HashMap<ListenerId, CommentListener>,
    upstream: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    channels: Mutex<HashMap<Uuid, Channel>>,
    next_id: AtomicU64,
}

impl Registry {
    fn listeners_for(&self, pdf_id: Uuid) -> Vec<CommentListener> {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pdf_id)
            .map(|c| c.listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    fn remove(&self, pdf_id: Uuid, id: ListenerId) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(channel) = channels.get_mut(&pdf_id) else {
            return;
        };
        channel.listeners.remove(&id);
        if channel.listeners.is_empty() {
            if let Some(channel) = channels.remove(&pdf_id) {
                channel.upstream.abort();
                debug!("Closed realtime channel for pdf {pdf_id}");
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let channels = self.channels.get_mut().unwrap_or_else(|e| e.into_inner());
        for channel in channels.values() {
            channel.upstream.abort();
        }
    }
}

#[derive(Clone)]
pub struct CommentService {
    backend: Backend,
    registry: Arc<Registry>,
}

impl CommentService {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            registry: Arc::new(Registry::default()),
        }
    }

    /// Persists a comment as given; constraint checks are left to the backend.
    pub async fn create_comment(&self, params: NewComment) -> Result<Comment, AppError> {
        self.backend
            .insert_comment(params)
            .await
            .during("create comment")
    }

    /// All comments of a document, oldest first.
    pub async fn get_comments_by_pdf_id(&self, pdf_id: Uuid) -> Result<Vec<Comment>, AppError> {
        self.backend
            .rows
            .list_comments(pdf_id)
            .await
            .during("fetch comments")
    }

    /// Registers `listener` for `pdf_id`. The first listener for a document opens the
    /// upstream subscription. Dropping the returned handle unsubscribes.
    pub fn subscribe_to_comments<F>(&self, pdf_id: Uuid, listener: F) -> CommentSubscription
    where
        F: Fn(&[Comment]) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let mut channels = self
            .registry
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let channel = channels.entry(pdf_id).or_insert_with(|| {
            debug!("Opening realtime channel for pdf {pdf_id}");
            let stream = self.backend.changes.subscribe(Backend::comment_inserts(pdf_id));
            Channel {
                listeners: HashMap::new(),
                upstream: tokio::spawn(relay_changes(
                    self.backend.clone(),
                    Arc::downgrade(&self.registry),
                    pdf_id,
                    stream,
                )),
            }
        });
        channel.listeners.insert(id, Arc::new(listener));

        CommentSubscription {
            registry: Arc::downgrade(&self.registry),
            pdf_id,
            id,
        }
    }

    /// Number of documents that currently hold an upstream subscription.
    pub fn open_channels(&self) -> usize {
        self.registry
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

async fn relay_changes(
    backend: Backend,
    registry: Weak<Registry>,
    pdf_id: Uuid,
    mut stream: ChangeStream,
) {
    // A lag notice is treated like an insert: the dropped events may have been ours.
    while let Some(item) = stream.next().await {
        if let StreamItem::Lagged(skipped) = item {
            debug!("Resyncing pdf {pdf_id} after {skipped} dropped change events");
        }
        let comments = match backend.rows.list_comments(pdf_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to refetch comments for pdf {pdf_id}: {e}");
                continue;
            }
        };
        let Some(registry) = registry.upgrade() else {
            return;
        };
        // Listeners run outside the registry lock so they may (un)subscribe freely.
        for listener in registry.listeners_for(pdf_id) {
            listener(&comments);
        }
    }
    debug!("Change stream for pdf {pdf_id} ended");
}

/// Unsubscribe handle returned by [`CommentService::subscribe_to_comments`].
pub struct CommentSubscription {
    registry: Weak<Registry>,
    pdf_id: Uuid,
    id: ListenerId,
}

impl CommentSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for CommentSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.pdf_id, self.id);
        }
    }
}
