//! Repository contract and its local/cloud implementations

mod cloud;
mod codec;
mod factory;
mod local;
mod timer;
mod todo;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entity, EntityId};

pub use cloud::CloudRepository;
pub use codec::{decode_documents, decode_records, encode_collection};
pub use factory::RepositoryFactory;
pub use local::LocalRepository;
pub use timer::TimerRepositoryExt;
pub use todo::TodoRepositoryExt;

/// Which store a repository reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Local,
    Cloud,
}

/// Outcome of a multi-item write without cross-item transactions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkReport {
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub const fn is_complete(&self) -> bool {
        self.failed == 0
    }

    fn record<T>(&mut self, result: &Result<T>) {
        if result.is_ok() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// CRUD surface for one entity type, independent of the storage backend.
///
/// `initialize` must succeed before any other call.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    fn backend(&self) -> Backend;

    async fn initialize(&self) -> Result<()>;

    /// Every stored record; empty when nothing is stored
    async fn get_all(&self) -> Result<Vec<T>>;

    async fn get_by_id(&self, id: &EntityId) -> Result<Option<T>>;

    /// Persist a new record. Fails with `AlreadyExists` if the id is taken.
    async fn add(&self, item: &T) -> Result<()>;

    /// Replace the record sharing `item.id`. Fails with `NotFound` if absent.
    async fn update(&self, item: &T) -> Result<()>;

    /// Fails with `NotFound` if absent.
    async fn delete(&self, id: &EntityId) -> Result<()>;

    /// Apply several updates and deletes.
    ///
    /// Items succeed or fail independently; nothing is rolled back. Backends
    /// that can submit the whole batch at once override this.
    async fn write_batch(&self, updates: Vec<T>, deletes: Vec<EntityId>) -> BulkReport {
        let mut report = BulkReport::default();
        for item in &updates {
            let result = self.update(item).await;
            if let Err(error) = &result {
                tracing::warn!("Bulk update of {} {} failed: {}", T::KIND, item.id(), error);
            }
            report.record(&result);
        }
        for id in &deletes {
            let result = self.delete(id).await;
            if let Err(error) = &result {
                tracing::warn!("Bulk delete of {} {} failed: {}", T::KIND, id, error);
            }
            report.record(&result);
        }
        report
    }
}
