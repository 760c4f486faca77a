//! Session persistence

use std::sync::Arc;

use async_trait::async_trait;

use super::{AuthError, AuthResult, AuthSession};
use crate::storage::KeyValueStore;

const SESSION_KEY: &str = "auth_session";

#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    async fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    async fn clear_session(&self) -> AuthResult<()>;
}

/// Keeps the serialized session in the local key-value store
#[derive(Clone)]
pub struct KeyValueSessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl KeyValueSessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionPersistence for KeyValueSessionStore {
    async fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let raw = self
            .store
            .get(SESSION_KEY)
            .await
            .map_err(|error| AuthError::SessionStorage(error.to_string()))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let serialized = serde_json::to_string(session)?;
        self.store
            .set(SESSION_KEY, &serialized)
            .await
            .map_err(|error| AuthError::SessionStorage(error.to_string()))
    }

    async fn clear_session(&self) -> AuthResult<()> {
        self.store
            .remove(SESSION_KEY)
            .await
            .map_err(|error| AuthError::SessionStorage(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::storage::MemoryKeyValueStore;

    #[tokio::test]
    async fn save_load_clear_round_trip() {
        let store = KeyValueSessionStore::new(Arc::new(MemoryKeyValueStore::new()));
        assert!(store.load_session().await.unwrap().is_none());

        let session = AuthSession {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 1_700_000_000,
            user: AuthUser::anonymous("guest"),
        };
        store.save_session(&session).await.unwrap();
        assert_eq!(store.load_session().await.unwrap(), Some(session));

        store.clear_session().await.unwrap();
        assert!(store.load_session().await.unwrap().is_none());
    }
}
