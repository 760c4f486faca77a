//! Cached services over the current repository.
//!
//! Each service keeps the last-loaded collection in a `watch` channel:
//! [`EntityService::items`] reads it without I/O and
//! [`EntityService::subscribe`] observes every change. Mutations go to the
//! repository first and touch the cache only once the repository call has
//! succeeded.

mod note;
mod timer;
mod todo;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{watch, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::models::{Entity, EntityId, Note, TaskTimer, Todo};
use crate::repository::{Backend, Repository, RepositoryFactory};

pub use note::NoteAutosave;

pub type TodoService = EntityService<Todo>;
pub type TimerService = EntityService<TaskTimer>;
pub type NoteService = EntityService<Note>;

/// Snapshot of one entity collection as last read from the repository
pub type Snapshot<T> = Arc<Vec<T>>;

pub struct EntityService<T: Entity> {
    factory: RepositoryFactory,
    repository: RwLock<Option<Arc<dyn Repository<T>>>>,
    cache: watch::Sender<Snapshot<T>>,
    initialized: AtomicBool,
    // Held by every mutation and repository swap so a delta is never applied
    // to a cache loaded from a different repository.
    lock: Mutex<()>,
}

impl<T: Entity> EntityService<T> {
    pub fn new(factory: RepositoryFactory) -> Self {
        let (cache, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            factory,
            repository: RwLock::new(None),
            cache,
            initialized: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }

    /// Resolve a repository and load the cache. Later calls are no-ops.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.guard().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.swap_repository().await
    }

    /// Re-resolve the repository for the current auth state and reload.
    ///
    /// On failure the previous repository and cache stay in place.
    pub async fn refresh_repository(&self) -> Result<()> {
        let _guard = self.guard().await;
        self.swap_repository().await
    }

    /// Reload the cache from the current repository
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.guard().await;
        self.reload_locked().await
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Backend of the current repository, if one is resolved
    pub fn backend(&self) -> Option<Backend> {
        self.current_repository().map(|repository| repository.backend())
    }

    /// Last loaded collection
    pub fn items(&self) -> Snapshot<T> {
        self.cache.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.cache.subscribe()
    }

    /// Cached record with the given id
    pub fn get(&self, id: &EntityId) -> Option<T> {
        self.cache.borrow().iter().find(|item| item.id() == id).cloned()
    }

    pub async fn add(&self, item: T) -> Result<T> {
        let _guard = self.guard().await;
        self.repository()?.add(&item).await?;
        self.upsert_cached(item.clone());
        Ok(item)
    }

    pub async fn update(&self, item: T) -> Result<T> {
        let _guard = self.guard().await;
        self.repository()?.update(&item).await?;
        self.upsert_cached(item.clone());
        Ok(item)
    }

    pub async fn delete(&self, id: &EntityId) -> Result<()> {
        let _guard = self.guard().await;
        self.repository()?.delete(id).await?;
        self.cache.send_modify(|items| {
            Arc::make_mut(items).retain(|item| item.id() != id);
        });
        Ok(())
    }

    /// Read the stored record, apply `change`, and persist it
    pub async fn modify<F>(&self, id: &EntityId, change: F) -> Result<T>
    where
        F: FnOnce(&mut T) + Send,
    {
        let _guard = self.guard().await;
        let repository = self.repository()?;
        let mut item = repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        change(&mut item);
        repository.update(&item).await?;
        self.upsert_cached(item.clone());
        Ok(item)
    }

    fn current_repository(&self) -> Option<Arc<dyn Repository<T>>> {
        self.repository
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn repository(&self) -> Result<Arc<dyn Repository<T>>> {
        self.current_repository()
            .ok_or(Error::NotInitialized(T::KIND.storage_key()))
    }

    async fn swap_repository(&self) -> Result<()> {
        let repository = self.factory.create::<T>().await?;
        let items = repository.get_all().await?;
        tracing::info!(
            "Loaded {} {} from {:?} repository",
            items.len(),
            T::KIND,
            repository.backend()
        );

        *self
            .repository
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(repository);
        self.cache.send_replace(Arc::new(items));
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn reload_locked(&self) -> Result<()> {
        let items = self.repository()?.get_all().await?;
        self.cache.send_replace(Arc::new(items));
        Ok(())
    }

    async fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    fn upsert_cached(&self, item: T) {
        self.cache.send_modify(|items| {
            let items = Arc::make_mut(items);
            match items.iter_mut().find(|existing| existing.id() == item.id()) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, SessionState};
    use crate::storage::{KeyValueStore, MemoryDocumentStore, MemoryKeyValueStore};
    use crate::test_support::{memory_factory as factory_for, session_for, signed_in};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn mutations_require_initialize() {
        let service = NoteService::new(factory_for(&SessionState::new()));
        assert!(!service.is_initialized());
        assert!(matches!(
            service.add(Note::new("a", "b")).await,
            Err(Error::NotInitialized(_))
        ));
        assert!(service.items().is_empty());
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let factory = RepositoryFactory::new(
            kv.clone(),
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(SessionState::new()),
        );
        let service = NoteService::new(factory);
        service.initialize().await.unwrap();

        // Written behind the service's back; only a refresh may pick it up.
        let note = Note::new("external", "");
        kv.set("notes", &serde_json::to_string(&vec![note.clone()]).unwrap())
            .await
            .unwrap();
        service.initialize().await.unwrap();
        assert!(service.items().is_empty());

        service.refresh_repository().await.unwrap();
        assert_eq!(*service.items(), vec![note]);
    }

    #[tokio::test]
    async fn mutations_update_cache_and_notify() {
        let service = NoteService::new(factory_for(&SessionState::new()));
        service.initialize().await.unwrap();
        let mut rx = service.subscribe();

        let note = service.add(Note::new("Draft", "")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update().clone(), vec![note.clone()]);

        let edited = service
            .modify(&note.id, |note| note.set_content("body"))
            .await
            .unwrap();
        assert_eq!(service.get(&note.id), Some(edited));

        service.delete(&note.id).await.unwrap();
        assert!(service.items().is_empty());
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_cache_untouched() {
        let service = NoteService::new(factory_for(&SessionState::new()));
        service.initialize().await.unwrap();
        let note = service.add(Note::new("Only", "")).await.unwrap();
        let before = service.items();

        assert!(service.add(note.clone()).await.is_err());
        assert!(service.update(Note::new("missing", "")).await.is_err());
        assert!(service.delete(&"missing".into()).await.is_err());
        assert_eq!(service.items(), before);
    }

    #[tokio::test]
    async fn refresh_follows_auth_state() {
        let state = SessionState::new();
        let service = TodoService::new(factory_for(&state));
        service.initialize().await.unwrap();
        service.add(Todo::new("local only")).await.unwrap();
        assert_eq!(service.backend(), Some(Backend::Local));

        state.set_session(signed_in("u1").session());
        service.refresh_repository().await.unwrap();
        assert_eq!(service.backend(), Some(Backend::Cloud));
        assert!(service.items().is_empty());

        state.set_session(Some(session_for(AuthUser::anonymous("guest"))));
        service.refresh_repository().await.unwrap();
        assert_eq!(service.backend(), Some(Backend::Local));
        assert_eq!(service.items().len(), 1);
    }
}
