//! Ledger session state.
//!
//! A provider is either `Unauthenticated` or `Authenticated` with an access
//! token and its expiry. Expired or missing access tokens are renewed
//! silently from the stored refresh credential; the interactive consent flow
//! only runs when no refresh credential has ever been stored. Only the
//! refresh credential is persisted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::AuthError;

const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl AuthenticatedSession {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

/// Token payload returned by an OAuth2 token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    pub refresh_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self) -> Result<AuthenticatedSession, AuthError>;
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Runs the operator-facing consent flow and exchanges the resulting code.
    async fn authorize_interactively(&self) -> Result<TokenResponse, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// File holding the refresh credential between runs.
pub struct TokenStore {
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    refresh_token: String,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<String>, AuthError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AuthError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let stored: StoredCredential = serde_json::from_str(&raw)?;
        Ok(Some(stored.refresh_token).filter(|t| !t.is_empty()))
    }

    pub async fn save(&self, refresh_token: &str) -> Result<(), AuthError> {
        let body = serde_json::to_string_pretty(&StoredCredential {
            refresh_token: refresh_token.to_string(),
        })?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|source| AuthError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

enum SessionState {
    Unauthenticated,
    Authenticated {
        session: AuthenticatedSession,
        refresh_token: String,
    },
}

pub struct OAuthSessionProvider<E> {
    endpoint: E,
    store: TokenStore,
    interactive: bool,
    state: Mutex<SessionState>,
}

impl<E: TokenEndpoint> OAuthSessionProvider<E> {
    pub fn new(endpoint: E, store: TokenStore, interactive: bool) -> Self {
        Self {
            endpoint,
            store,
            interactive,
            state: Mutex::new(SessionState::Unauthenticated),
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Authenticated { .. })
    }

    async fn authorize_interactively(&self) -> Result<(TokenResponse, String), AuthError> {
        info!("no stored credential, starting interactive authorization");
        let response = self.endpoint.authorize_interactively().await?;
        let refresh_token = response
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::Interactive("no refresh token was granted".into()))?;
        self.store.save(&refresh_token).await?;
        Ok((response, refresh_token))
    }

    async fn refresh(&self, refresh_token: String) -> Result<(TokenResponse, String), AuthError> {
        info!("refreshing ledger access token");
        let response = self.endpoint.refresh(&refresh_token).await?;
        match response.refresh_token.clone() {
            Some(rotated) if rotated != refresh_token => {
                self.store.save(&rotated).await?;
                Ok((response, rotated))
            }
            _ => Ok((response, refresh_token)),
        }
    }
}

#[async_trait]
impl<E: TokenEndpoint> SessionProvider for OAuthSessionProvider<E> {
    async fn get_session(&self) -> Result<AuthenticatedSession, AuthError> {
        let mut state = self.state.lock().await;

        let stored = match &*state {
            SessionState::Authenticated { session, .. } if !session.is_expired_at(Utc::now()) => {
                return Ok(session.clone());
            }
            SessionState::Authenticated { refresh_token, .. } => Some(refresh_token.clone()),
            SessionState::Unauthenticated => self.store.load().await?,
        };

        let (response, refresh_token) = match stored {
            Some(token) => self.refresh(token).await?,
            None if self.interactive => self.authorize_interactively().await?,
            None => return Err(AuthError::NoCredential),
        };

        let session = AuthenticatedSession::new(
            response.access_token,
            Utc::now() + Duration::seconds(response.expires_in),
        );
        *state = SessionState::Authenticated {
            session: session.clone(),
            refresh_token,
        };
        Ok(session)
    }
}
