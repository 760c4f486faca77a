//! Supabase auth client

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{
    AuthError, AuthResult, AuthSession, AuthUser, SessionPersistence, SessionState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    ConfirmationRequired,
}

/// Signs users in and out against Supabase and publishes the result to a
/// [`SessionState`]
#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence + Clone> {
    auth_url: String,
    anon_key: String,
    client: Client,
    store: S,
    state: SessionState,
}

impl<S: SessionPersistence + Clone> SupabaseAuthClient<S> {
    pub fn new(
        url: impl AsRef<str>,
        anon_key: impl Into<String>,
        timeout: Duration,
        store: S,
        state: SessionState,
    ) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().timeout(timeout).build()?,
            store,
            state,
        })
    }

    /// Session state this client publishes to
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Load the persisted session, refreshing it if it has expired
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session().await? else {
            self.state.clear();
            return Ok(None);
        };

        if !stored_session.is_expired() {
            self.state.set_session(Some(stored_session.clone()));
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session().await?;
                self.state.clear();
                Ok(None)
            }
        }
    }

    /// Register a new account
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/signup", self.auth_url))
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        match response.into_session()? {
            Some(session) => {
                self.publish(&session).await?;
                Ok(SignUpOutcome::SignedIn(session))
            }
            None => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    /// Start a guest session. Guest data stays on this device.
    pub async fn sign_in_anonymously(&self) -> AuthResult<AuthSession> {
        let request = self.public_request(
            self.client
                .post(format!("{}/signup", self.auth_url))
                .json(&serde_json::json!({})),
        );
        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Anonymous sign-in did not include an active session".to_string())
        })?;

        self.publish(&session).await?;
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );

        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Sign-in response did not include an active session".to_string())
        })?;

        self.publish(&session).await?;
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({
            "refresh_token": refresh_token,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Refresh response did not include an active session".to_string())
        })?;

        self.publish(&session).await?;
        Ok(session)
    }

    /// Refresh the current session if its access token has expired.
    ///
    /// Returns the session now in effect, or `None` when signed out.
    pub async fn refresh_if_expired(&self) -> AuthResult<Option<AuthSession>> {
        match self.state.session() {
            Some(session) if session.is_expired() => {
                tracing::debug!("Access token expired, refreshing session");
                self.refresh_session(&session.refresh_token).await.map(Some)
            }
            current => Ok(current),
        }
    }

    /// Revoke the current session and clear it locally
    pub async fn sign_out(&self) -> AuthResult<()> {
        if let Some(access_token) = self.state.access_token() {
            let request = self
                .client
                .post(format!("{}/logout", self.auth_url))
                .header("apikey", &self.anon_key)
                .bearer_auth(access_token);

            let response = request.send().await?;
            if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED)
            {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AuthError::Api(parse_api_error(status, &body)));
            }
        }

        self.store.clear_session().await?;
        self.state.clear();
        Ok(())
    }

    async fn publish(&self, session: &AuthSession) -> AuthResult<()> {
        self.store.save_session(session).await?;
        self.state.set_session(Some(session.clone()));
        Ok(())
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send_auth_request(&self, request: RequestBuilder) -> AuthResult<SupabaseAuthResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<SupabaseAuthResponse>().await?)
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
    session: Option<SupabaseAuthResponseSession>,
}

impl SupabaseAuthResponse {
    fn into_session(self) -> AuthResult<Option<AuthSession>> {
        let nested_session = self.session;
        let access_token = self.access_token.or_else(|| {
            nested_session
                .as_ref()
                .and_then(|session| session.access_token.clone())
        });
        let refresh_token = self.refresh_token.or_else(|| {
            nested_session
                .as_ref()
                .and_then(|session| session.refresh_token.clone())
        });
        let expires_at = self
            .expires_at
            .or_else(|| {
                nested_session
                    .as_ref()
                    .and_then(|session| session.expires_at)
            })
            .or_else(|| {
                self.expires_in
                    .or_else(|| {
                        nested_session
                            .as_ref()
                            .and_then(|session| session.expires_in)
                    })
                    .map(|expires_in| Utc::now().timestamp().saturating_add(expires_in))
            });
        let user = self
            .user
            .or_else(|| nested_session.and_then(|session| session.user))
            .map(Into::into);

        match (access_token, refresh_token, expires_at, user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(Some(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user,
                }))
            }
            (None, None, None, Some(_)) => Ok(None),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponseSession {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    is_anonymous: bool,
}

impl From<SupabaseUser> for AuthUser {
    fn from(value: SupabaseUser) -> Self {
        Self {
            id: value.id,
            email: value.email.filter(|email| !email.trim().is_empty()),
            is_anonymous: value.is_anonymous,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::KeyValueSessionStore;
    use crate::storage::MemoryKeyValueStore;
    use crate::test_support::session_for;

    fn client_with(state: SessionState) -> SupabaseAuthClient<KeyValueSessionStore> {
        SupabaseAuthClient::new(
            // Nothing listens here; any request fails fast.
            "http://127.0.0.1:9",
            "anon",
            Duration::from_secs(2),
            KeyValueSessionStore::new(Arc::new(MemoryKeyValueStore::new())),
            state,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn refresh_if_expired_leaves_valid_sessions_alone() {
        assert!(client_with(SessionState::new()).refresh_if_expired().await.unwrap().is_none());

        let session = session_for(AuthUser::new("u1", None));
        let client = client_with(SessionState::with_session(session.clone()));
        assert_eq!(client.refresh_if_expired().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn refresh_if_expired_contacts_the_auth_server() {
        let mut session = session_for(AuthUser::new("u1", None));
        session.expires_at = Utc::now().timestamp() - 10;
        let client = client_with(SessionState::with_session(session));

        let error = client.refresh_if_expired().await.unwrap_err();
        assert!(matches!(error, AuthError::Http(_)));
    }

    #[test]
    fn normalize_auth_url_appends_auth_path() {
        let normalized = normalize_auth_url("https://demo.supabase.co").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
    }

    #[test]
    fn normalize_auth_url_keeps_existing_auth_path() {
        let normalized = normalize_auth_url("https://demo.supabase.co/auth/v1/").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
    }

    #[test]
    fn normalize_auth_url_rejects_missing_scheme() {
        assert!(normalize_auth_url("demo.supabase.co").is_err());
        assert!(normalize_auth_url("  ").is_err());
    }

    #[test]
    fn response_without_session_fields_means_confirmation_required() {
        let response = SupabaseAuthResponse {
            access_token: None,
            refresh_token: None,
            expires_at: None,
            expires_in: None,
            user: Some(SupabaseUser {
                id: "user".to_string(),
                email: Some("user@example.com".to_string()),
                is_anonymous: false,
            }),
            session: None,
        };
        assert!(response.into_session().unwrap().is_none());
    }

    #[test]
    fn anonymous_flag_is_carried_into_session() {
        let response: SupabaseAuthResponse = serde_json::from_str(
            r#"{
                "access_token": "a",
                "refresh_token": "r",
                "expires_in": 3600,
                "user": {"id": "guest", "email": "", "is_anonymous": true}
            }"#,
        )
        .unwrap();
        let session = response.into_session().unwrap().unwrap();
        assert!(session.user.is_anonymous);
        assert_eq!(session.user.email, None);
        assert!(!session.is_expired());
    }

    #[test]
    fn partial_session_is_an_error() {
        let response: SupabaseAuthResponse =
            serde_json::from_str(r#"{"access_token": "a", "user": {"id": "u"}}"#).unwrap();
        assert!(response.into_session().is_err());
    }

    #[test]
    fn parse_api_error_prefers_message_fields() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error_description": "Invalid login credentials"}"#,
        );
        assert_eq!(message, "Invalid login credentials (400)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }
}
