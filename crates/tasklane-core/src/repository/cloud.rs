//! Repository over the signed-in user's cloud document collection

use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::codec::{decode_documents, decode_one};
use super::{Backend, BulkReport, Repository};
use crate::auth::AuthProvider;
use crate::error::{Error, Result};
use crate::models::{Entity, EntityId};
use crate::storage::{BatchWrite, CollectionPath, DocumentStore};

pub struct CloudRepository<T> {
    documents: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    path: RwLock<Option<CollectionPath>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> CloudRepository<T> {
    pub fn new(documents: Arc<dyn DocumentStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            documents,
            auth,
            path: RwLock::new(None),
            _entity: PhantomData,
        }
    }

    /// Collection resolved by `initialize`, still owned by the current user
    fn path(&self) -> Result<CollectionPath> {
        let path = match self.path.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
        .ok_or(Error::NotInitialized(T::KIND.collection()))?;

        match self.auth.current_user() {
            Some(user) if !user.is_anonymous && user.id == path.user_id() => Ok(path),
            _ => Err(Error::NotAuthenticated),
        }
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for CloudRepository<T> {
    fn backend(&self) -> Backend {
        Backend::Cloud
    }

    async fn initialize(&self) -> Result<()> {
        let user = self
            .auth
            .current_user()
            .filter(|user| !user.is_anonymous)
            .ok_or(Error::NotAuthenticated)?;
        let path = CollectionPath::for_user(user.id, T::KIND);
        tracing::info!("Cloud {} repository initialized at {}", T::KIND, path);

        match self.path.write() {
            Ok(mut guard) => *guard = Some(path),
            Err(poisoned) => *poisoned.into_inner() = Some(path),
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        let path = self.path()?;
        Ok(decode_documents(self.documents.list(&path).await?))
    }

    async fn get_by_id(&self, id: &EntityId) -> Result<Option<T>> {
        let path = self.path()?;
        Ok(self
            .documents
            .get(&path, id.as_str())
            .await?
            .map(decode_one))
    }

    async fn add(&self, item: &T) -> Result<()> {
        let path = self.path()?;
        let id = item.id().as_str();
        if self.documents.get(&path, id).await?.is_some() {
            return Err(Error::AlreadyExists(id.to_string()));
        }
        self.documents
            .set(&path, id, serde_json::to_value(item)?)
            .await
    }

    async fn update(&self, item: &T) -> Result<()> {
        let path = self.path()?;
        let id = item.id().as_str();
        if self.documents.get(&path, id).await?.is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        self.documents
            .set(&path, id, serde_json::to_value(item)?)
            .await
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        let path = self.path()?;
        if self.documents.delete(&path, id.as_str()).await? {
            Ok(())
        } else {
            Err(Error::NotFound(id.to_string()))
        }
    }

    /// Submits the batch as one commit; it succeeds or fails as a whole.
    ///
    /// Callers pass ids they just read from this repository, so updates are
    /// sent as upserts without a per-document existence check.
    async fn write_batch(&self, updates: Vec<T>, deletes: Vec<EntityId>) -> BulkReport {
        let total = updates.len() + deletes.len();
        if total == 0 {
            return BulkReport::default();
        }

        let writes: Result<Vec<BatchWrite>> = updates
            .iter()
            .map(|item| {
                Ok(BatchWrite::Set {
                    id: item.id().to_string(),
                    data: serde_json::to_value(item)?,
                })
            })
            .chain(deletes.iter().map(|id| {
                Ok(BatchWrite::Delete {
                    id: id.to_string(),
                })
            }))
            .collect();

        let result = match (self.path(), writes) {
            (Ok(path), Ok(writes)) => self.documents.commit(&path, writes).await,
            (Err(error), _) | (_, Err(error)) => Err(error),
        };

        match result {
            Ok(()) => BulkReport {
                succeeded: total,
                failed: 0,
            },
            Err(error) => {
                tracing::warn!("Batch commit to cloud {} failed: {}", T::KIND, error);
                BulkReport {
                    succeeded: 0,
                    failed: total,
                }
            }
        }
    }
}
