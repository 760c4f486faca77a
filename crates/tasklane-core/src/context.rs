//! Composition root wiring storage, auth, sync and services together

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auth::{
    AuthProvider, AuthUser, KeyValueSessionStore, SessionState, SupabaseAuthClient,
};
use crate::config::AppConfig;
use crate::error::Result;
use crate::repository::RepositoryFactory;
use crate::services::{NoteAutosave, NoteService, TimerService, TodoService};
use crate::storage::{
    DocumentStore, KeyValueStore, LibSqlKeyValueStore, MemoryDocumentStore, RestDocumentStore,
};
use crate::sync::{SyncEngine, SyncOutcome, SyncSummary};

/// Auth client type used when cloud settings are configured
pub type AuthClient = SupabaseAuthClient<KeyValueSessionStore>;

/// Everything a front end needs, constructed once and passed around
pub struct AppContext {
    config: AppConfig,
    session: SessionState,
    factory: RepositoryFactory,
    sync: SyncEngine,
    todos: Arc<TodoService>,
    timers: Arc<TimerService>,
    notes: Arc<NoteService>,
    auth_client: Option<AuthClient>,
}

impl AppContext {
    /// Wire the context over already-opened stores
    pub fn new(
        config: AppConfig,
        local_store: Arc<dyn KeyValueStore>,
        documents: Arc<dyn DocumentStore>,
        session: SessionState,
    ) -> Self {
        let factory = RepositoryFactory::new(local_store, documents, Arc::new(session.clone()));
        Self {
            config,
            session,
            sync: SyncEngine::new(factory.clone()),
            todos: Arc::new(TodoService::new(factory.clone())),
            timers: Arc::new(TimerService::new(factory.clone())),
            notes: Arc::new(NoteService::new(factory.clone())),
            factory,
            auth_client: None,
        }
    }

    /// Open the stores described by `config`.
    ///
    /// Without cloud settings the app runs local-only: the cloud side is an
    /// in-memory store that nobody can sign in to.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let local_store: Arc<dyn KeyValueStore> = match &config.local_db_path {
            Some(path) => Arc::new(LibSqlKeyValueStore::open(path).await?),
            None => Arc::new(LibSqlKeyValueStore::open_in_memory().await?),
        };
        let session = SessionState::new();

        let Some(cloud) = config.cloud_settings()? else {
            tracing::info!("Running in local-only mode (no cloud config)");
            return Ok(Self::new(
                config,
                local_store,
                Arc::new(MemoryDocumentStore::new()),
                session,
            ));
        };

        tracing::info!("Cloud storage enabled: {}", cloud.supabase_url);
        let documents = RestDocumentStore::new(
            &cloud.supabase_url,
            &cloud.documents_table,
            cloud.anon_key.clone(),
            cloud.request_timeout,
            session.clone(),
        )?;
        let auth_client = SupabaseAuthClient::new(
            &cloud.supabase_url,
            cloud.anon_key,
            cloud.request_timeout,
            KeyValueSessionStore::new(Arc::clone(&local_store)),
            session.clone(),
        )?;

        let mut context = Self::new(config, local_store, Arc::new(documents), session);
        context.auth_client = Some(auth_client);
        Ok(context)
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    pub const fn factory(&self) -> &RepositoryFactory {
        &self.factory
    }

    pub const fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }

    pub const fn todos(&self) -> &Arc<TodoService> {
        &self.todos
    }

    pub const fn timers(&self) -> &Arc<TimerService> {
        &self.timers
    }

    pub const fn notes(&self) -> &Arc<NoteService> {
        &self.notes
    }

    pub const fn auth_client(&self) -> Option<&AuthClient> {
        self.auth_client.as_ref()
    }

    /// Debouncer saving notes after the configured quiet period
    pub fn note_autosave(&self) -> NoteAutosave {
        NoteAutosave::new(Arc::clone(&self.notes), self.config.note_autosave_delay())
    }

    /// Restore any persisted session, then load every service
    pub async fn initialize(&self) -> Result<()> {
        if let Some(client) = &self.auth_client {
            if let Err(error) = client.restore_session().await {
                tracing::warn!("Could not restore auth session: {}", error);
            }
        }

        futures::try_join!(
            self.todos.initialize(),
            self.timers.initialize(),
            self.notes.initialize()
        )?;
        Ok(())
    }

    /// Re-resolve every service's repository for the current auth state
    pub async fn refresh_all(&self) -> Result<()> {
        futures::try_join!(
            self.todos.refresh_repository(),
            self.timers.refresh_repository(),
            self.notes.refresh_repository()
        )?;
        Ok(())
    }

    /// React to an auth transition.
    ///
    /// Becoming fully authenticated first copies local data up to the cloud.
    /// Every transition then points the services at the matching store.
    pub async fn on_auth_changed(
        &self,
        previous: Option<&AuthUser>,
        current: Option<&AuthUser>,
    ) -> Result<Option<SyncOutcome>> {
        let was_full = previous.is_some_and(|user| !user.is_anonymous);
        let is_full = current.is_some_and(|user| !user.is_anonymous);

        let outcome = if is_full && !was_full {
            self.refresh_expired_session().await;
            Some(self.sync.synchronize_to_cloud().await)
        } else {
            None
        };

        self.refresh_all().await?;
        Ok(outcome)
    }

    /// Copy cloud data onto this device while the session is still valid
    pub async fn prepare_sign_out(&self) -> SyncOutcome {
        self.refresh_expired_session().await;
        self.sync.synchronize_to_local().await
    }

    /// Sync down, then end the session.
    ///
    /// The session ends even if the download failed; the returned outcome
    /// tells the caller whether some data is still only in the cloud.
    pub async fn sign_out(&self) -> Result<SyncOutcome> {
        let outcome = self.prepare_sign_out().await;
        if outcome.summary().is_some_and(SyncSummary::has_failures) {
            tracing::warn!("Signing out before all cloud data reached this device");
        }
        match &self.auth_client {
            Some(client) => client.sign_out().await?,
            None => self.session.clear(),
        }
        Ok(outcome)
    }

    /// Cloud requests need a live access token; refresh it before a pass.
    /// A failed refresh is logged and the pass reports the auth failure.
    async fn refresh_expired_session(&self) {
        if let Some(client) = &self.auth_client {
            if let Err(error) = client.refresh_if_expired().await {
                tracing::warn!("Could not refresh expired session: {}", error);
            }
        }
    }

    /// Watch the session and run [`on_auth_changed`](Self::on_auth_changed)
    /// for every user change until the returned task is aborted
    pub fn spawn_auth_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let context = Arc::clone(self);
        let mut users = self.session.subscribe();
        tokio::spawn(async move {
            let mut previous = users.borrow_and_update().clone();
            while users.changed().await.is_ok() {
                let current = users.borrow_and_update().clone();
                if let Err(error) = context
                    .on_auth_changed(previous.as_ref(), current.as_ref())
                    .await
                {
                    tracing::error!("Failed to apply auth change: {}", error);
                }
                previous = current;
            }
        })
    }
}
