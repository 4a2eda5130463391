use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::BackendError;
use crate::models::{AuthUser, Session};

const AUTH_EVENT_CAPACITY: usize = 64;

/// Session lifecycle notifications pushed by the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    UserUpdated(Session),
    SignedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    GitHub,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "github",
        }
    }
}

/// External identity provider. Owns the OAuth dance; this crate only consumes sessions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The session currently held by this client, if any.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Resolves a bearer access token. `Ok(None)` for an invalid or expired token.
    async fn user_for_token(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError>;

    /// Returns the URL the browser must be sent to in order to start the OAuth flow.
    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<String, BackendError>;

    /// Adopts the tokens handed back by the OAuth redirect as this client's session and
    /// emits `SignedIn`. `Ok(None)` when the access token does not resolve to a user.
    async fn restore_session(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<Option<Session>, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Verifies redirect tokens against `provider` without adopting them anywhere.
pub async fn session_from_tokens(
    provider: &dyn IdentityProvider,
    access_token: String,
    refresh_token: Option<String>,
) -> Result<Option<Session>, BackendError> {
    let Some(user) = provider.user_for_token(&access_token).await? else {
        return Ok(None);
    };
    Ok(Some(Session {
        access_token,
        refresh_token,
        expires_at: None,
        user,
    }))
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: GoTrueUserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct GoTrueUserMetadata {
    user_name: Option<String>,
    preferred_username: Option<String>,
    avatar_url: Option<String>,
}

impl From<GoTrueUser> for AuthUser {
    fn from(u: GoTrueUser) -> Self {
        AuthUser {
            id: u.id,
            email: u.email.unwrap_or_default(),
            username: u
                .user_metadata
                .user_name
                .or(u.user_metadata.preferred_username),
            avatar_url: u.user_metadata.avatar_url,
        }
    }
}

/// Client for a GoTrue-compatible auth REST API (`/auth/v1/...`).
pub struct GoTrueIdentity {
    http: Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueIdentity {
    pub fn new(base_url: &str, anon_key: String) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            session: RwLock::new(None),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }
}

#[async_trait]
impl IdentityProvider for GoTrueIdentity {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.session.read().await.clone())
    }

    async fn user_for_token(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        let response = self
            .http
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("Identity provider rejected token ({status})");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Identity(format!(
                "user lookup returned {status}: {body}"
            )));
        }

        let user: GoTrueUser = response.json().await?;
        Ok(Some(user.into()))
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<String, BackendError> {
        let url = Url::parse_with_params(
            &self.endpoint("authorize"),
            &[("provider", provider.as_str()), ("redirect_to", redirect_to)],
        )
        .map_err(|e| BackendError::Identity(format!("invalid authorize URL: {e}")))?;
        Ok(url.into())
    }

    async fn restore_session(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<Option<Session>, BackendError> {
        let Some(session) = session_from_tokens(self, access_token, refresh_token).await? else {
            return Ok(None);
        };
        *self.session.write().await = Some(session.clone());
        info!("Restored session for {}", session.user.id);
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session.write().await.take();
        let _ = self.events.send(AuthEvent::SignedOut);

        let Some(session) = previous else {
            return Ok(());
        };
        let response = self
            .http
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            warn!("Logout returned {}", response.status());
            return Err(BackendError::Identity(format!(
                "logout returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
