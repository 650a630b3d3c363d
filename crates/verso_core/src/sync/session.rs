//! Authentication session shared by sync passes.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, VersoError};
use crate::sync::remote::fetch_login;

/// An authenticated identity on the remote host.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    /// Account that owns the project repositories.
    pub login: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("login", &self.login)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Process-wide cache of the current session.
///
/// Cloning shares the same slot. A 401 from the remote host clears it through
/// [`SessionHolder::invalidate`], forcing re-authentication on the next pass.
#[derive(Clone, Default)]
pub struct SessionHolder {
    slot: Arc<Mutex<Option<Session>>>,
}

impl SessionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Session> {
        self.slot.lock().ok().and_then(|s| s.clone())
    }

    pub fn set(&self, session: Session) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(session);
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.take().is_some() {
                debug!("Session invalidated");
            }
        }
    }
}

/// Acquires sessions for the orchestrator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Reuse credentials that are already available. Never prompts.
    async fn existing_session(&self) -> Result<Option<Session>>;

    /// Interactive sign-in; may prompt the user.
    async fn sign_in(&self) -> Result<Session>;
}

/// Uses an access token taken from the environment and resolves its login.
pub struct TokenAuthProvider {
    api_url: String,
    token: Option<String>,
    token_env: String,
    client: reqwest::Client,
}

impl TokenAuthProvider {
    pub fn new(api_url: impl Into<String>, token: Option<String>, token_env: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token,
            token_env: token_env.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn session_for(&self, token: &str) -> Result<Session> {
        let login = fetch_login(&self.client, &self.api_url, token).await?;
        Ok(Session {
            token: token.to_string(),
            login,
        })
    }
}

#[async_trait]
impl AuthProvider for TokenAuthProvider {
    async fn existing_session(&self) -> Result<Option<Session>> {
        match &self.token {
            Some(token) => self.session_for(token).await.map(Some),
            None => Ok(None),
        }
    }

    async fn sign_in(&self) -> Result<Session> {
        match &self.token {
            Some(token) => self.session_for(token).await,
            None => {
                debug!("No token in ${}", self.token_env);
                Err(VersoError::NotAuthenticated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_is_shared_between_clones() {
        let holder = SessionHolder::new();
        let other = holder.clone();
        holder.set(Session {
            token: "t".into(),
            login: "me".into(),
        });
        assert_eq!(other.get().map(|s| s.login), Some("me".to_string()));

        other.invalidate();
        assert!(holder.get().is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Session {
            token: "ghp_secret".into(),
            login: "me".into(),
        };
        let printed = format!("{session:?}");
        assert!(!printed.contains("ghp_secret"));
        assert!(printed.contains("me"));
    }

    #[tokio::test]
    async fn test_token_provider_without_token() {
        let provider = TokenAuthProvider::new("http://127.0.0.1:9", None, "VERSO_TOKEN");
        assert!(provider.existing_session().await.unwrap().is_none());
        assert!(matches!(
            provider.sign_in().await,
            Err(VersoError::NotAuthenticated)
        ));
    }
}
