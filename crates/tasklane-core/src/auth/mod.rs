//! Authentication collaborator
//!
//! The rest of the crate only needs to know who the current user is, whether
//! that user is anonymous, and when that changes. [`SessionState`] is the
//! in-process source of that information; [`SupabaseAuthClient`] drives it
//! against a Supabase auth endpoint.

mod session_store;
mod supabase;

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

pub use session_store::{KeyValueSessionStore, SessionPersistence};
pub use supabase::{normalize_auth_url, SignUpOutcome, SupabaseAuthClient};

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

impl AuthUser {
    /// A fully authenticated user
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
            is_anonymous: false,
        }
    }

    /// A guest user without credentials
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            is_anonymous: true,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as Unix seconds
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Session storage error: {0}")]
    SessionStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Read-only view of the authentication state
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, anonymous or not
    fn current_user(&self) -> Option<AuthUser>;

    /// Receiver that observes every sign-in, sign-out and user switch
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;

    fn current_user_id(&self) -> Option<String> {
        self.current_user().map(|user| user.id)
    }

    fn is_anonymous(&self) -> bool {
        self.current_user().is_some_and(|user| user.is_anonymous)
    }

    /// Signed in with real credentials
    fn is_fully_authenticated(&self) -> bool {
        self.current_user().is_some_and(|user| !user.is_anonymous)
    }
}

/// Current session, shared by everything that needs to know who is signed in
#[derive(Clone)]
pub struct SessionState {
    session: Arc<RwLock<Option<AuthSession>>>,
    user_tx: Arc<watch::Sender<Option<AuthUser>>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Signed-out state
    pub fn new() -> Self {
        let (user_tx, _) = watch::channel(None);
        Self {
            session: Arc::new(RwLock::new(None)),
            user_tx: Arc::new(user_tx),
        }
    }

    /// State that starts with the given session
    pub fn with_session(session: AuthSession) -> Self {
        let state = Self::new();
        state.set_session(Some(session));
        state
    }

    /// Replace the current session and notify subscribers if the user changed
    pub fn set_session(&self, session: Option<AuthSession>) {
        let user = session.as_ref().map(|session| session.user.clone());
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
        self.user_tx.send_if_modified(|current| {
            if *current == user {
                false
            } else {
                *current = user;
                true
            }
        });
    }

    pub fn clear(&self) {
        self.set_session(None);
    }

    pub fn session(&self) -> Option<AuthSession> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Bearer token of the current session, if any
    pub fn access_token(&self) -> Option<String> {
        self.session().map(|session| session.access_token)
    }
}

impl AuthProvider for SessionState {
    fn current_user(&self) -> Option<AuthUser> {
        self.user_tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.user_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_for(user: AuthUser) -> AuthSession {
        AuthSession {
            access_token: "secret-access-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at: Utc::now().timestamp() + 3600,
            user,
        }
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let session = session_for(AuthUser::new("user", None));
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn session_expiry_uses_skew() {
        let mut session = session_for(AuthUser::new("user", None));
        assert!(!session.is_expired());
        session.expires_at = Utc::now().timestamp() + 30;
        assert!(session.is_expired());
    }

    #[test]
    fn provider_distinguishes_anonymous_users() {
        let state = SessionState::new();
        assert!(state.current_user().is_none());
        assert!(!state.is_anonymous());
        assert!(!state.is_fully_authenticated());

        state.set_session(Some(session_for(AuthUser::anonymous("guest"))));
        assert!(state.is_anonymous());
        assert!(!state.is_fully_authenticated());

        state.set_session(Some(session_for(AuthUser::new("u1", None))));
        assert!(state.is_fully_authenticated());
        assert_eq!(state.current_user_id().as_deref(), Some("u1"));
        assert_eq!(state.access_token().as_deref(), Some("secret-access-token"));
    }

    #[test]
    fn subscribers_see_user_changes_only() {
        let state = SessionState::new();
        let mut rx = state.subscribe();
        assert!(!rx.has_changed().unwrap());

        state.set_session(Some(session_for(AuthUser::new("u1", None))));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(|u| u.id.as_str()), Some("u1"));

        // A token refresh for the same user is not an auth transition.
        let mut refreshed = session_for(AuthUser::new("u1", None));
        refreshed.access_token = "rotated".to_string();
        state.set_session(Some(refreshed));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(state.access_token().as_deref(), Some("rotated"));

        state.clear();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }
}
