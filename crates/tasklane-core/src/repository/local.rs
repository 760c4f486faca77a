//! Repository over the on-device key-value store
//!
//! Each entity kind is one JSON array under a fixed key. Writes rewrite the
//! whole array; records that failed to decode are carried over untouched.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::codec::{decode_one, decode_records, record_id};
use super::{Backend, BulkReport, Repository};
use crate::error::{Error, Result};
use crate::models::{Entity, EntityId};
use crate::storage::KeyValueStore;

pub struct LocalRepository<T> {
    store: Arc<dyn KeyValueStore>,
    initialized: AtomicBool,
    // Serializes read-modify-write cycles on the stored array. Shared by every
    // repository writing the same key of the same store.
    write_lock: Arc<Mutex<()>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> LocalRepository<T> {
    /// Repository with a write lock of its own. Other repositories over the
    /// same store must not write this kind concurrently.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_write_lock(store, Arc::default())
    }

    /// Repository sharing `write_lock` with every other writer of this kind
    pub fn with_write_lock(store: Arc<dyn KeyValueStore>, write_lock: Arc<Mutex<()>>) -> Self {
        Self {
            store,
            initialized: AtomicBool::new(false),
            write_lock,
            _entity: PhantomData,
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::NotInitialized(T::KIND.storage_key()))
        }
    }

    async fn load_raw(&self) -> Result<Vec<Value>> {
        self.ensure_initialized()?;
        let Some(raw) = self.store.get(T::KIND.storage_key()).await? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save_raw(&self, records: &[Value]) -> Result<()> {
        let encoded = serde_json::to_string(records)?;
        self.store.set(T::KIND.storage_key(), &encoded).await
    }
}

fn position_of(records: &[Value], id: &EntityId) -> Option<usize> {
    records
        .iter()
        .position(|record| record_id(record).as_ref() == Some(id))
}

#[async_trait]
impl<T: Entity> Repository<T> for LocalRepository<T> {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn initialize(&self) -> Result<()> {
        self.store.initialize().await?;
        if !self.initialized.swap(true, Ordering::AcqRel) {
            tracing::info!("Local {} repository initialized", T::KIND);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        Ok(decode_records(self.load_raw().await?))
    }

    async fn get_by_id(&self, id: &EntityId) -> Result<Option<T>> {
        let mut records = self.load_raw().await?;
        Ok(position_of(&records, id).map(|index| decode_one(records.swap_remove(index))))
    }

    async fn add(&self, item: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_raw().await?;
        if position_of(&records, item.id()).is_some() {
            return Err(Error::AlreadyExists(item.id().to_string()));
        }
        records.push(serde_json::to_value(item)?);
        self.save_raw(&records).await
    }

    async fn update(&self, item: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_raw().await?;
        let index =
            position_of(&records, item.id()).ok_or_else(|| Error::NotFound(item.id().to_string()))?;
        records[index] = serde_json::to_value(item)?;
        self.save_raw(&records).await
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_raw().await?;
        let index = position_of(&records, id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        records.remove(index);
        self.save_raw(&records).await
    }

    /// One read-modify-write for the whole batch; missing ids count as failures.
    async fn write_batch(&self, updates: Vec<T>, deletes: Vec<EntityId>) -> BulkReport {
        let total = updates.len() + deletes.len();
        let _guard = self.write_lock.lock().await;
        let mut records = match self.load_raw().await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!("Bulk write to local {} failed: {}", T::KIND, error);
                return BulkReport {
                    succeeded: 0,
                    failed: total,
                };
            }
        };

        let mut applied = 0;
        for item in &updates {
            let encoded = serde_json::to_value(item);
            match (position_of(&records, item.id()), encoded) {
                (Some(index), Ok(value)) => {
                    records[index] = value;
                    applied += 1;
                }
                (None, _) => {
                    tracing::warn!("Bulk update skipped missing {} {}", T::KIND, item.id());
                }
                (_, Err(error)) => tracing::warn!("Bulk update of {} failed: {}", item.id(), error),
            }
        }
        for id in &deletes {
            if let Some(index) = position_of(&records, id) {
                records.remove(index);
                applied += 1;
            } else {
                tracing::warn!("Bulk delete skipped missing {} {}", T::KIND, id);
            }
        }

        match self.save_raw(&records).await {
            Ok(()) => BulkReport {
                succeeded: applied,
                failed: total - applied,
            },
            Err(error) => {
                tracing::warn!("Bulk write to local {} failed: {}", T::KIND, error);
                BulkReport {
                    succeeded: 0,
                    failed: total,
                }
            }
        }
    }
}
