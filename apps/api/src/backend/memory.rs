//! In-memory backend adapters used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::{
    session_from_tokens, AuthEvent, Backend, BackendError, BroadcastFeed, IdentityProvider,
    ObjectStore, OAuthProvider, RowStore,
};
use crate::models::{AuthUser, Comment, NewComment, NewPdf, PdfRecord, Session};

#[derive(Default)]
pub struct MemoryRowStore {
    pdfs: Mutex<Vec<PdfRecord>>,
    /// Kept in insertion order, which plays the role of the `seq` column.
    comments: Mutex<Vec<Comment>>,
    frozen_clock: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryRowStore {
    pub fn comment_count(&self) -> usize {
        self.comments.lock().unwrap().len()
    }

    /// Stamps every later comment with `at`, like inserts sharing one transaction time.
    pub fn freeze_clock(&self, at: DateTime<Utc>) {
        *self.frozen_clock.lock().unwrap() = Some(at);
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert_pdf(&self, pdf: NewPdf) -> Result<PdfRecord, BackendError> {
        let mut pdfs = self.pdfs.lock().unwrap();
        if pdfs.iter().any(|p| p.share_token == pdf.share_token) {
            return Err(BackendError::Storage("duplicate share token".into()));
        }
        let now = Utc::now();
        let record = PdfRecord {
            id: Uuid::new_v4(),
            owner_id: pdf.owner_id,
            filename: pdf.filename,
            storage_path: pdf.storage_path,
            share_token: pdf.share_token,
            created_at: now,
            updated_at: now,
        };
        pdfs.push(record.clone());
        Ok(record)
    }

    async fn get_pdf(&self, id: Uuid) -> Result<Option<PdfRecord>, BackendError> {
        Ok(self.pdfs.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn get_pdf_by_share_token(
        &self,
        token: &str,
    ) -> Result<Option<PdfRecord>, BackendError> {
        Ok(self
            .pdfs
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.share_token == token)
            .cloned())
    }

    async fn list_pdfs_by_owner(&self, owner_id: Uuid) -> Result<Vec<PdfRecord>, BackendError> {
        let mut out: Vec<_> = self
            .pdfs
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        out.reverse();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_pdf(&self, id: Uuid) -> Result<bool, BackendError> {
        let mut pdfs = self.pdfs.lock().unwrap();
        let before = pdfs.len();
        pdfs.retain(|p| p.id != id);
        let existed = pdfs.len() != before;
        if existed {
            self.comments.lock().unwrap().retain(|c| c.pdf_id != id);
        }
        Ok(existed)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, BackendError> {
        if !self.pdfs.lock().unwrap().iter().any(|p| p.id == comment.pdf_id) {
            return Err(BackendError::Storage(format!(
                "foreign key violation: pdf {} does not exist",
                comment.pdf_id
            )));
        }
        let created_at = self.frozen_clock.lock().unwrap().unwrap_or_else(Utc::now);
        let mut comments = self.comments.lock().unwrap();
        let row = Comment {
            id: Uuid::new_v4(),
            pdf_id: comment.pdf_id,
            x: comment.x,
            y: comment.y,
            page_number: comment.page_number,
            body: comment.body,
            author_name: comment.author_name,
            created_at,
        };
        comments.push(row.clone());
        Ok(row)
    }

    async fn list_comments(&self, pdf_id: Uuid) -> Result<Vec<Comment>, BackendError> {
        let mut out: Vec<_> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.pdf_id == pdf_id)
            .cloned()
            .collect();
        // Stable, so ties fall back to insertion order.
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_removals: AtomicBool,
    fail_uploads: AtomicBool,
}

impl MemoryObjectStore {
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), BackendError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BackendError::Storage("upload refused".into()));
        }
        self.objects.lock().unwrap().insert(path.to_string(), body);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), BackendError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(BackendError::Storage("remove refused".into()));
        }
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://objects.test/resumes/{path}")
    }
}

/// Identity provider with a fixed token table and a controllable event stream.
#[derive(Default)]
pub struct MemoryIdentity {
    tokens: Mutex<HashMap<String, AuthUser>>,
    session: Mutex<Option<Session>>,
    pub events: EventSender,
    fail_sign_in: AtomicBool,
}

pub struct EventSender(broadcast::Sender<AuthEvent>);

impl Default for EventSender {
    fn default() -> Self {
        Self(broadcast::channel(16).0)
    }
}

impl EventSender {
    pub fn send(&self, event: AuthEvent) {
        let _ = self.0.send(event);
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let idp = Self::new();
        idp.add_token(&session.access_token, session.user.clone());
        *idp.session.lock().unwrap() = Some(session);
        idp
    }

    pub fn add_token(&self, token: &str, user: AuthUser) {
        self.tokens.lock().unwrap().insert(token.to_string(), user);
    }

    pub fn fail_sign_in(&self, fail: bool) {
        self.fail_sign_in.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn user_for_token(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.tokens.lock().unwrap().get(access_token).cloned())
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<String, BackendError> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(BackendError::Identity("provider unavailable".into()));
        }
        Ok(format!(
            "https://auth.test/authorize?provider={}&redirect_to={redirect_to}",
            provider.as_str()
        ))
    }

    async fn restore_session(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<Option<Session>, BackendError> {
        let Some(session) = session_from_tokens(self, access_token, refresh_token).await? else {
            return Ok(None);
        };
        *self.session.lock().unwrap() = Some(session.clone());
        self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        *self.session.lock().unwrap() = None;
        self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.0.subscribe()
    }
}

pub fn test_user(name: &str) -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        email: format!("{name}@example.com"),
        username: Some(name.to_string()),
        avatar_url: None,
    }
}

/// Handles onto the concrete adapters behind a test [`Backend`].
pub struct TestBackend {
    pub backend: Backend,
    pub rows: Arc<MemoryRowStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub identity: Arc<MemoryIdentity>,
}

pub fn test_backend() -> TestBackend {
    let rows = Arc::new(MemoryRowStore::default());
    let objects = Arc::new(MemoryObjectStore::default());
    let identity = Arc::new(MemoryIdentity::new());
    let backend = Backend {
        rows: rows.clone(),
        objects: objects.clone(),
        changes: Arc::new(BroadcastFeed::new()),
        identity: identity.clone(),
    };
    TestBackend {
        backend,
        rows,
        objects,
        identity,
    }
}
