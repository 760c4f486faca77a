//! Cloud document store contract and in-memory implementation

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::EntityKind;

/// Location of one entity collection inside a user's cloud space
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    user_id: String,
    collection: String,
}

impl CollectionPath {
    pub fn new(user_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            collection: collection.into(),
        }
    }

    /// Collection holding `kind` records for `user_id`
    pub fn for_user(user_id: impl Into<String>, kind: EntityKind) -> Self {
        Self::new(user_id, kind.collection())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "users/{}/{}", self.user_id, self.collection)
    }
}

/// One stored document: its key and JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// A single write inside a batch commit
#[derive(Debug, Clone, PartialEq)]
pub enum BatchWrite {
    Set { id: String, data: Value },
    Delete { id: String },
}

/// Per-user document collections in the cloud
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in the collection, in no particular order
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>>;

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Value>>;

    /// Create or replace the document keyed by `id`
    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> Result<()>;

    /// Remove a document. Returns whether it existed.
    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<bool>;

    /// Submit several writes as one unit, atomically where the backend allows
    async fn commit(&self, path: &CollectionPath, writes: Vec<BatchWrite>) -> Result<()>;
}

type Collections = HashMap<CollectionPath, BTreeMap<String, Value>>;

/// Document store held in process memory; batch commits are atomic
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> Result<std::sync::MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| Error::Storage("document store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>> {
        let collections = self.collections()?;
        Ok(collections
            .get(path)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Value>> {
        let collections = self.collections()?;
        Ok(collections
            .get(path)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> Result<()> {
        self.collections()?
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<bool> {
        Ok(self
            .collections()?
            .get_mut(path)
            .is_some_and(|documents| documents.remove(id).is_some()))
    }

    async fn commit(&self, path: &CollectionPath, writes: Vec<BatchWrite>) -> Result<()> {
        let mut collections = self.collections()?;
        let documents = collections.entry(path.clone()).or_default();
        for write in writes {
            match write {
                BatchWrite::Set { id, data } => {
                    documents.insert(id, data);
                }
                BatchWrite::Delete { id } => {
                    documents.remove(&id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_path_display() {
        let path = CollectionPath::for_user("user-1", EntityKind::Timer);
        assert_eq!(path.to_string(), "users/user-1/timers");
        assert_eq!(path.collection(), "timers");
        assert_eq!(path.user_id(), "user-1");
    }

    #[tokio::test]
    async fn memory_store_scopes_documents_per_user() {
        let store = MemoryDocumentStore::new();
        let alice = CollectionPath::for_user("alice", EntityKind::Todo);
        let bob = CollectionPath::for_user("bob", EntityKind::Todo);

        store.set(&alice, "1", json!({"id": "1"})).await.unwrap();

        assert_eq!(store.list(&alice).await.unwrap().len(), 1);
        assert!(store.list(&bob).await.unwrap().is_empty());
        assert_eq!(store.get(&bob, "1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_delete_reports_existence() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::for_user("alice", EntityKind::Note);
        store.set(&path, "n1", json!({})).await.unwrap();

        assert!(store.delete(&path, "n1").await.unwrap());
        assert!(!store.delete(&path, "n1").await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_commit_applies_all_writes() {
        let store = MemoryDocumentStore::new();
        let path = CollectionPath::for_user("alice", EntityKind::Todo);
        store.set(&path, "old", json!({"id": "old"})).await.unwrap();

        store
            .commit(
                &path,
                vec![
                    BatchWrite::Set {
                        id: "a".to_string(),
                        data: json!({"id": "a"}),
                    },
                    BatchWrite::Delete {
                        id: "old".to_string(),
                    },
                ],
            )
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list(&path)
            .await
            .unwrap()
            .into_iter()
            .map(|document| document.id)
            .collect();
        assert_eq!(ids, vec!["a".to_string()]);
    }
}
