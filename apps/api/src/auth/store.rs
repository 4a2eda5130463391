//! Observable holder for the current authentication state.
//!
//! Every change goes through one merge-and-broadcast path: under the notify lock the
//! change is applied, a complete snapshot is taken and every listener is called with it.
//! Listeners therefore observe states in mutation order and never a half-applied one.
//! A listener may read [`AuthStore::state`] but must not subscribe from its callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::{AuthEvent, IdentityProvider, OAuthProvider};
use crate::errors::{AppError, BackendContext};
use crate::models::{AuthUser, Session};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            session: None,
            loading: true,
            error: None,
        }
    }
}

impl AuthState {
    fn adopt_session(&mut self, session: Option<Session>) {
        self.user = session.as_ref().map(|s| s.user.clone());
        self.session = session;
        self.loading = false;
    }
}

type Listener = Arc<dyn Fn(&AuthState) + Send + Sync>;

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    state: Mutex<AuthState>,
    /// Held from mutation through the last listener call.
    notify: Mutex<()>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<Inner>,
}

impl AuthStore {
    /// Starts loading the current session in the background and then follows the
    /// provider's auth events. Must be called inside a tokio runtime.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let store = Self {
            inner: Arc::new(Inner {
                provider,
                state: Mutex::new(AuthState::default()),
                notify: Mutex::new(()),
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        };
        // Register for events before fetching so nothing between the two is lost.
        let events = store.inner.provider.auth_events();
        tokio::spawn(follow_provider(Arc::downgrade(&store.inner), events));
        store
    }

    /// Calls `listener` with the current state right away and after every change.
    pub fn subscribe<F>(&self, listener: F) -> AuthSubscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let _notify = self.inner.notify.lock().unwrap_or_else(|e| e.into_inner());
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, listener.clone());
        listener(&self.state());
        AuthSubscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn state(&self) -> AuthState {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the provider URL to redirect the browser to. On failure the error is
    /// also recorded in the state.
    pub async fn sign_in_with_github(&self, redirect_to: &str) -> Result<String, AppError> {
        self.update(|s| s.error = None);
        let result = self
            .inner
            .provider
            .sign_in_with_oauth(OAuthProvider::GitHub, redirect_to)
            .await
            .during("sign in with GitHub");
        if let Err(e) = &result {
            let message = e.to_string();
            self.update(|s| s.error = Some(message));
        }
        result
    }

    /// Finishes the OAuth round trip with the tokens from the redirect. The provider
    /// emits `SignedIn` on success, which this store is already following; an invalid
    /// token leaves the user signed out and records an error.
    pub async fn complete_sign_in(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<Option<AuthUser>, AppError> {
        let restored = self
            .inner
            .provider
            .restore_session(access_token, refresh_token)
            .await
            .during("restore session");
        match &restored {
            Ok(Some(session)) => {
                let session = session.clone();
                self.update(|s| {
                    s.adopt_session(Some(session));
                    s.error = None;
                });
            }
            Ok(None) => self.update(|s| {
                s.error = Some("Sign-in link is invalid or has expired".to_string());
            }),
            Err(e) => {
                let message = e.to_string();
                self.update(|s| s.error = Some(message));
            }
        }
        restored.map(|session| session.map(|s| s.user))
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        let result = self.inner.provider.sign_out().await.during("sign out");
        match &result {
            Ok(()) => self.update(|s| {
                s.adopt_session(None);
                s.error = None;
            }),
            Err(e) => {
                let message = e.to_string();
                self.update(|s| s.error = Some(message));
            }
        }
        result
    }

    fn update(&self, change: impl FnOnce(&mut AuthState)) {
        apply(&self.inner, change);
    }
}

fn apply(inner: &Inner, change: impl FnOnce(&mut AuthState)) {
    let _notify = inner.notify.lock().unwrap_or_else(|e| e.into_inner());
    let snapshot = {
        let mut state = inner.state.lock().unwrap_or_else(|e| e.into_inner());
        change(&mut state);
        state.clone()
    };
    let listeners: Vec<Listener> = inner
        .listeners
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .values()
        .cloned()
        .collect();
    for listener in listeners {
        listener(&snapshot);
    }
}

async fn follow_provider(inner: Weak<Inner>, mut events: broadcast::Receiver<AuthEvent>) {
    let provider = match inner.upgrade() {
        Some(i) => i.provider.clone(),
        None => return,
    };
    let initial = provider.get_session().await;
    {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match initial {
            Ok(session) => apply(&inner, |s| s.adopt_session(session)),
            Err(e) => {
                warn!("Failed to load session: {e}");
                let message = format!("Failed to load session: {e}");
                apply(&inner, |s| {
                    s.loading = false;
                    s.error = Some(message);
                });
            }
        }
    }

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Missed {n} auth events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::UserUpdated(session) => {
                info!("Auth session active for {}", session.user.id);
                apply(&inner, |s| {
                    s.adopt_session(Some(session));
                    s.error = None;
                });
            }
            AuthEvent::SignedOut => {
                info!("Signed out");
                apply(&inner, |s| s.adopt_session(None));
            }
        }
    }
    debug!("Auth event stream ended");
}

/// Returned by [`AuthStore::subscribe`]. Unsubscribes when dropped.
pub struct AuthSubscription {
    inner: Weak<Inner>,
    id: u64,
}

impl AuthSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{test_user, MemoryIdentity};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn session_for(name: &str) -> Session {
        Session {
            access_token: format!("token-{name}"),
            refresh_token: None,
            expires_at: None,
            user: test_user(name),
        }
    }

    fn recorder() -> (
        impl Fn(&AuthState) + Send + Sync + 'static,
        mpsc::UnboundedReceiver<AuthState>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |s: &AuthState| {
                let _ = tx.send(s.clone());
            },
            rx,
        )
    }

    async fn next_settled(rx: &mut mpsc::UnboundedReceiver<AuthState>) -> AuthState {
        loop {
            let state = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if !state.loading {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn test_loads_existing_session() {
        let session = session_for("ada");
        let store = AuthStore::new(Arc::new(MemoryIdentity::with_session(session.clone())));
        let (listener, mut rx) = recorder();
        let _sub = store.subscribe(listener);

        let state = next_settled(&mut rx).await;
        assert_eq!(state.session, Some(session.clone()));
        assert_eq!(state.user, Some(session.user));
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_state_immediately() {
        let store = AuthStore::new(Arc::new(MemoryIdentity::new()));
        let (listener, mut rx) = recorder();
        let _sub = store.subscribe(listener);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_follows_sign_in_and_sign_out_events() {
        let idp = Arc::new(MemoryIdentity::new());
        let store = AuthStore::new(idp.clone());
        let (listener, mut rx) = recorder();
        let _sub = store.subscribe(listener);
        assert!(next_settled(&mut rx).await.user.is_none());

        let session = session_for("grace");
        idp.events.send(AuthEvent::SignedIn(session.clone()));
        let state = next_settled(&mut rx).await;
        assert_eq!(state.user.as_ref().map(|u| u.id), Some(session.user.id));

        store.sign_out().await.unwrap();
        let state = next_settled(&mut rx).await;
        assert!(state.user.is_none());
        assert!(state.session.is_none());
        assert_eq!(store.state().user, None);
    }

    #[tokio::test]
    async fn test_sign_in_failure_sets_error() {
        let idp = Arc::new(MemoryIdentity::new());
        idp.fail_sign_in(true);
        let store = AuthStore::new(idp);

        let err = store
            .sign_in_with_github("https://app.test/upload")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to sign in with GitHub"));
        assert_eq!(store.state().error, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_sign_in_success_returns_redirect() {
        let store = AuthStore::new(Arc::new(MemoryIdentity::new()));
        let url = store
            .sign_in_with_github("https://app.test/upload")
            .await
            .unwrap();
        assert!(url.contains("provider=github"));
        assert!(store.state().error.is_none());
    }

    #[tokio::test]
    async fn test_complete_sign_in_adopts_redirect_tokens() {
        let idp = Arc::new(MemoryIdentity::new());
        let user = test_user("mae");
        idp.add_token("redirect-token", user.clone());
        let store = AuthStore::new(idp.clone());
        let (listener, mut rx) = recorder();
        let _sub = store.subscribe(listener);
        assert!(next_settled(&mut rx).await.user.is_none());

        let signed_in = store
            .complete_sign_in("redirect-token".into(), Some("refresh".into()))
            .await
            .unwrap();
        assert_eq!(signed_in, Some(user.clone()));
        let state = next_settled(&mut rx).await;
        assert_eq!(state.user, Some(user.clone()));
        assert_eq!(
            idp.get_session().await.unwrap().map(|s| s.access_token),
            Some("redirect-token".to_string())
        );
    }

    #[tokio::test]
    async fn test_complete_sign_in_with_bad_token_sets_error() {
        let store = AuthStore::new(Arc::new(MemoryIdentity::new()));
        let signed_in = store
            .complete_sign_in("stale".into(), None)
            .await
            .unwrap();
        assert!(signed_in.is_none());
        let state = store.state();
        assert!(state.user.is_none());
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_unsubscribed_listener_is_not_called() {
        let idp = Arc::new(MemoryIdentity::new());
        let store = AuthStore::new(idp.clone());
        let (listener, mut rx) = recorder();
        let sub = store.subscribe(listener);
        let _ = rx.try_recv();
        sub.unsubscribe();

        idp.events.send(AuthEvent::SignedIn(session_for("x")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_ends_on_latest_state_under_concurrent_updates() {
        let idp = Arc::new(MemoryIdentity::new());
        idp.fail_sign_in(true);
        let store = AuthStore::new(idp.clone());
        let (listener, mut rx) = recorder();
        let sub = store.subscribe(listener);
        next_settled(&mut rx).await;
        drop(sub);

        let last: Arc<Mutex<Option<AuthState>>> = Arc::new(Mutex::new(None));
        let sink = last.clone();
        let _sub = store.subscribe(move |s: &AuthState| {
            // Hold up delivery of the signed-in snapshot.
            if s.user.is_some() && s.error.is_none() {
                std::thread::sleep(Duration::from_millis(150));
            }
            *sink.lock().unwrap() = Some(s.clone());
        });

        idp.events.send(AuthEvent::SignedIn(session_for("lin")));
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = store.sign_in_with_github("https://app.test/upload").await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let state = store.state();
        assert!(state.user.is_some());
        assert!(state.error.is_some());
        assert_eq!(last.lock().unwrap().clone(), Some(state));
    }
}
