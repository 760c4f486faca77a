//! Chooses the local or cloud repository from the current auth state

use std::sync::Arc;

use tokio::sync::Mutex;

use super::{Backend, CloudRepository, LocalRepository, Repository};
use crate::auth::AuthProvider;
use crate::error::Result;
use crate::models::{Entity, EntityKind, Note, TaskTimer, Todo};
use crate::storage::{DocumentStore, KeyValueStore};

/// One write lock per local storage key
#[derive(Default)]
struct LocalWriteLocks {
    todos: Arc<Mutex<()>>,
    timers: Arc<Mutex<()>>,
    notes: Arc<Mutex<()>>,
}

impl LocalWriteLocks {
    fn for_kind(&self, kind: EntityKind) -> Arc<Mutex<()>> {
        let lock = match kind {
            EntityKind::Todo => &self.todos,
            EntityKind::Timer => &self.timers,
            EntityKind::Note => &self.notes,
        };
        Arc::clone(lock)
    }
}

/// Builds initialized repositories over shared storage backends.
///
/// Clones share the local write locks, so every local repository handed out
/// for one kind serializes its writes with the others.
#[derive(Clone)]
pub struct RepositoryFactory {
    local_store: Arc<dyn KeyValueStore>,
    local_locks: Arc<LocalWriteLocks>,
    documents: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
}

impl RepositoryFactory {
    pub fn new(
        local_store: Arc<dyn KeyValueStore>,
        documents: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            local_store,
            local_locks: Arc::default(),
            documents,
            auth,
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Backend the current user's data lives in: the cloud for fully
    /// authenticated users, this device for everyone else
    pub fn current_backend(&self) -> Backend {
        if self.auth.is_fully_authenticated() {
            Backend::Cloud
        } else {
            Backend::Local
        }
    }

    /// Initialized repository for the current auth state.
    ///
    /// A cloud initialization failure is returned as-is; there is no silent
    /// fallback to local storage.
    pub async fn create<T: Entity>(&self) -> Result<Arc<dyn Repository<T>>> {
        match self.current_backend() {
            Backend::Local => self.local().await,
            Backend::Cloud => self.cloud().await,
        }
    }

    /// Initialized repository over the on-device store
    pub async fn local<T: Entity>(&self) -> Result<Arc<dyn Repository<T>>> {
        let repository = LocalRepository::<T>::with_write_lock(
            Arc::clone(&self.local_store),
            self.local_locks.for_kind(T::KIND),
        );
        repository.initialize().await?;
        Ok(Arc::new(repository))
    }

    /// Initialized repository over the signed-in user's cloud collection
    pub async fn cloud<T: Entity>(&self) -> Result<Arc<dyn Repository<T>>> {
        let repository =
            CloudRepository::<T>::new(Arc::clone(&self.documents), Arc::clone(&self.auth));
        repository.initialize().await?;
        Ok(Arc::new(repository))
    }

    pub async fn create_todo_repository(&self) -> Result<Arc<dyn Repository<Todo>>> {
        self.create().await
    }

    pub async fn create_timer_repository(&self) -> Result<Arc<dyn Repository<TaskTimer>>> {
        self.create().await
    }

    pub async fn create_note_repository(&self) -> Result<Arc<dyn Repository<Note>>> {
        self.create().await
    }
}
