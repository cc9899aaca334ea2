// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Server-side sessions holding OAuth credentials
//!
//! The browser only ever sees an opaque random session id. Tokens and the
//! client secret stay in process memory and are dropped on logout, on
//! expiry, or when the server stops.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// OAuth token set for one signed-in browser
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Session {
    oauth_state: Option<String>,
    credentials: Option<Credentials>,
    last_seen: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            oauth_state: None,
            credentials: None,
            last_seen: now,
        }
    }
}

/// In-memory session table keyed by session id
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a new empty session and return its id
    pub async fn create(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) < self.ttl);
        sessions.insert(id.clone(), Session::new(now));
        debug!("Created session ({} active)", sessions.len());
        id
    }

    /// Whether `id` names a live session
    pub async fn exists(&self, id: &str) -> bool {
        self.with_session(id, |_| ()).await.is_some()
    }

    /// Credentials of a live session
    pub async fn credentials(&self, id: &str) -> Option<Credentials> {
        self.with_session(id, |s| s.credentials.clone()).await.flatten()
    }

    pub async fn set_credentials(&self, id: &str, credentials: Credentials) -> bool {
        self.with_session(id, |s| s.credentials = Some(credentials))
            .await
            .is_some()
    }

    /// Drop the credentials, keeping the session itself
    pub async fn clear_credentials(&self, id: &str) {
        self.with_session(id, |s| s.credentials = None).await;
    }

    /// Record the anti-forgery token for a pending login
    pub async fn set_oauth_state(&self, id: &str, state: String) -> bool {
        self.with_session(id, |s| s.oauth_state = Some(state))
            .await
            .is_some()
    }

    /// Consume the pending anti-forgery token
    pub async fn take_oauth_state(&self, id: &str) -> Option<String> {
        self.with_session(id, |s| s.oauth_state.take()).await.flatten()
    }

    /// Run `f` on a live session, refreshing its idle timer. Expired
    /// sessions are removed and yield `None`.
    async fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.with_session_at(id, Instant::now(), f).await
    }

    async fn with_session_at<R>(
        &self,
        id: &str,
        now: Instant,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        let expired = now.saturating_duration_since(sessions.get(id)?.last_seen) >= self.ttl;
        if expired {
            debug!("Session expired");
            sessions.remove(id);
            return None;
        }
        let session = sessions.get_mut(id)?;
        session.last_seen = now;
        Some(f(session))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_credentials() -> Credentials {
        Credentials {
            token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: "shh".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        }
    }

    #[tokio::test]
    async fn test_login_logout_cycle() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        assert!(store.credentials(&id).await.is_none());

        assert!(store.set_credentials(&id, sample_credentials()).await);
        assert_eq!(store.credentials(&id).await, Some(sample_credentials()));

        store.clear_credentials(&id).await;
        assert!(store.credentials(&id).await.is_none());
        assert!(store.exists(&id).await);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(!store.exists("nope").await);
        assert!(!store.set_credentials("nope", sample_credentials()).await);
        assert!(store.take_oauth_state("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_oauth_state_is_single_use() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        store.set_oauth_state(&id, "abc".to_string()).await;

        assert_eq!(store.take_oauth_state(&id).await.as_deref(), Some("abc"));
        assert!(store.take_oauth_state(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        store.set_credentials(&id, sample_credentials()).await;

        let later = Instant::now() + Duration::from_secs(61);
        let seen = store
            .with_session_at(&id, later, |s| s.credentials.clone())
            .await;
        assert!(seen.is_none());
        assert!(!store.exists(&id).await);
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.create().await;
        let b = store.create().await;
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", sample_credentials());
        assert!(!rendered.contains("ya29.access"));
        assert!(!rendered.contains("1//refresh"));
        assert!(!rendered.contains("shh"));
        assert!(rendered.contains("client.apps.googleusercontent.com"));
    }
}
