//! Fixtures shared by unit tests across modules

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use std::sync::Arc;

use crate::auth::{AuthSession, AuthUser, SessionState};
use crate::error::{Error, Result};
use crate::repository::RepositoryFactory;
use crate::storage::{
    BatchWrite, CollectionPath, Document, DocumentStore, MemoryDocumentStore, MemoryKeyValueStore,
};

/// Route test logs through the test harness; repeated calls are harmless
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn session_for(user: AuthUser) -> AuthSession {
    AuthSession {
        access_token: "test-access-token".to_string(),
        refresh_token: "test-refresh-token".to_string(),
        expires_at: Utc::now().timestamp() + 3600,
        user,
    }
}

pub fn signed_in(user_id: &str) -> SessionState {
    SessionState::with_session(session_for(AuthUser::new(
        user_id,
        Some(format!("{user_id}@example.com")),
    )))
}

pub fn anonymous(user_id: &str) -> SessionState {
    SessionState::with_session(session_for(AuthUser::anonymous(user_id)))
}

/// Factory over fresh in-memory stores
pub fn memory_factory(state: &SessionState) -> RepositoryFactory {
    RepositoryFactory::new(
        Arc::new(MemoryKeyValueStore::new()),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(state.clone()),
    )
}

/// Fixed instant `seconds` after 2024-01-01T00:00:00Z
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
}

/// Document store with injected failures: every call touching one
/// collection, or every write of one document id
pub struct FaultyDocumentStore {
    inner: MemoryDocumentStore,
    failing_collection: Option<&'static str>,
    failing_document: Option<&'static str>,
}

impl FaultyDocumentStore {
    pub fn new(failing_collection: &'static str) -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            failing_collection: Some(failing_collection),
            failing_document: None,
        }
    }

    /// Reads succeed; writes of document `id` fail
    pub fn failing_writes_of(id: &'static str) -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            failing_collection: None,
            failing_document: Some(id),
        }
    }

    fn check(&self, path: &CollectionPath) -> Result<()> {
        if self.failing_collection == Some(path.collection()) {
            Err(Error::Api(format!("injected failure for {path}")))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, path: &CollectionPath, id: &str) -> Result<()> {
        self.check(path)?;
        if self.failing_document == Some(id) {
            Err(Error::Api(format!("injected write failure for {path}/{id}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FaultyDocumentStore {
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>> {
        self.check(path)?;
        self.inner.list(path).await
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Value>> {
        self.check(path)?;
        self.inner.get(path, id).await
    }

    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> Result<()> {
        self.check_write(path, id)?;
        self.inner.set(path, id, data).await
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<bool> {
        self.check_write(path, id)?;
        self.inner.delete(path, id).await
    }

    async fn commit(&self, path: &CollectionPath, writes: Vec<BatchWrite>) -> Result<()> {
        for write in &writes {
            match write {
                BatchWrite::Set { id, .. } | BatchWrite::Delete { id } => {
                    self.check_write(path, id)?;
                }
            }
        }
        self.inner.commit(path, writes).await
    }
}
