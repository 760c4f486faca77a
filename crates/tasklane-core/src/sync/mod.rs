//! Last-write-wins synchronization between the local and cloud stores.
//!
//! [`synchronize`] reconciles one entity type: records missing from the
//! destination are added, records strictly newer on the source side replace
//! the destination copy, and everything else is left alone. Deletions are not
//! propagated. [`SyncEngine`] runs that pass for every entity kind around
//! sign-in and sign-out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::watch;

use crate::error::Result;
use crate::models::{Entity, EntityId, EntityKind, Note, TaskTimer, Todo};
use crate::repository::{Repository, RepositoryFactory};
use crate::state::SyncState;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    /// Local data is the source, the user's cloud collections the destination
    ToCloud,
    ToLocal,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToCloud => f.write_str("local -> cloud"),
            Self::ToLocal => f.write_str("cloud -> local"),
        }
    }
}

/// Per-item outcome counts of one pass over one entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    /// Destination copy was newer or equally new
    pub unchanged: usize,
    /// Unreadable source records that were not copied
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    /// Writes that reached the destination
    pub const fn written(&self) -> usize {
        self.added + self.updated
    }

    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn merge(&mut self, other: &Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

enum PendingWrite<T> {
    Add(T),
    Update(T),
}

/// Copy new and strictly newer records from `source` into `destination`.
///
/// Both collections are read before the first write. Writes are keyed by
/// distinct ids and run concurrently; a failed write is counted and logged
/// without stopping the rest. Only a failed read aborts the pass.
pub async fn synchronize<T: Entity>(
    source: &dyn Repository<T>,
    destination: &dyn Repository<T>,
) -> Result<SyncReport> {
    let (source_items, destination_items) =
        futures::try_join!(source.get_all(), destination.get_all())?;

    let destination_by_id: HashMap<EntityId, T> = destination_items
        .into_iter()
        .map(|item| (item.id().clone(), item))
        .collect();

    let mut report = SyncReport::default();
    let mut seen = HashSet::new();
    let mut pending = Vec::new();
    for item in source_items {
        if item.is_placeholder() {
            tracing::debug!("Not copying unreadable {} {}", T::KIND, item.id());
            report.skipped += 1;
            continue;
        }
        if !seen.insert(item.id().clone()) {
            tracing::warn!("Duplicate {} id {} in sync source", T::KIND, item.id());
            report.skipped += 1;
            continue;
        }

        match destination_by_id.get(item.id()) {
            None => pending.push(PendingWrite::Add(item)),
            Some(existing) if item.updated_at() > existing.updated_at() => {
                pending.push(PendingWrite::Update(item));
            }
            Some(_) => report.unchanged += 1,
        }
    }

    let results = join_all(pending.iter().map(|write| async move {
        match write {
            PendingWrite::Add(item) => destination.add(item).await,
            PendingWrite::Update(item) => destination.update(item).await,
        }
    }))
    .await;

    for (write, result) in pending.iter().zip(results) {
        match (write, result) {
            (PendingWrite::Add(_), Ok(())) => report.added += 1,
            (PendingWrite::Update(_), Ok(())) => report.updated += 1,
            (PendingWrite::Add(item) | PendingWrite::Update(item), Err(error)) => {
                tracing::warn!("Failed to sync {} {}: {}", T::KIND, item.id(), error);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No fully authenticated user, so there is no cloud side
    NotAuthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySyncStatus {
    Synced(SyncReport),
    /// Another pass for this kind was still in flight; nothing was touched
    AlreadyRunning,
    Failed(String),
}

/// Result of one direction across every entity kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub direction: SyncDirection,
    pub entities: Vec<(EntityKind, EntitySyncStatus)>,
}

impl SyncSummary {
    pub fn status(&self, kind: EntityKind) -> Option<&EntitySyncStatus> {
        self.entities
            .iter()
            .find(|(entry, _)| *entry == kind)
            .map(|(_, status)| status)
    }

    pub fn report(&self, kind: EntityKind) -> Option<&SyncReport> {
        match self.status(kind)? {
            EntitySyncStatus::Synced(report) => Some(report),
            _ => None,
        }
    }

    /// Counts summed over every kind that synced
    pub fn totals(&self) -> SyncReport {
        let mut totals = SyncReport::default();
        for (_, status) in &self.entities {
            if let EntitySyncStatus::Synced(report) = status {
                totals.merge(report);
            }
        }
        totals
    }

    /// Whether any kind failed outright or had items that failed to write
    pub fn has_failures(&self) -> bool {
        self.entities.iter().any(|(_, status)| match status {
            EntitySyncStatus::Synced(report) => !report.is_clean(),
            EntitySyncStatus::AlreadyRunning => false,
            EntitySyncStatus::Failed(_) => true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(SyncSummary),
}

impl SyncOutcome {
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub const fn summary(&self) -> Option<&SyncSummary> {
        match self {
            Self::Skipped(_) => None,
            Self::Completed(summary) => Some(summary),
        }
    }
}

/// Runs sync passes for every entity kind between the local store and the
/// signed-in user's cloud collections
pub struct SyncEngine {
    factory: RepositoryFactory,
    in_flight: Mutex<HashSet<EntityKind>>,
    state_tx: watch::Sender<SyncState>,
}

/// Marks one entity kind as being synced until dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<EntityKind>>,
    kind: EntityKind,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}

impl SyncEngine {
    pub fn new(factory: RepositoryFactory) -> Self {
        let initial = if factory.auth().is_fully_authenticated() {
            SyncState::Synced
        } else {
            SyncState::Offline
        };
        let (state_tx, _) = watch::channel(initial);
        Self {
            factory,
            in_flight: Mutex::new(HashSet::new()),
            state_tx,
        }
    }

    /// Observe sync progress
    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Copy local data into the user's cloud collections
    pub async fn synchronize_to_cloud(&self) -> SyncOutcome {
        self.run(SyncDirection::ToCloud).await
    }

    /// Copy the user's cloud data onto this device
    pub async fn synchronize_to_local(&self) -> SyncOutcome {
        self.run(SyncDirection::ToLocal).await
    }

    /// Run one direction for every kind in turn.
    ///
    /// A failure in one kind is recorded in the summary and the remaining
    /// kinds still run.
    pub async fn run(&self, direction: SyncDirection) -> SyncOutcome {
        if !self.factory.auth().is_fully_authenticated() {
            tracing::info!("Skipping {} sync: no fully authenticated user", direction);
            self.state_tx.send_replace(SyncState::Offline);
            return SyncOutcome::Skipped(SkipReason::NotAuthenticated);
        }

        tracing::info!("Starting {} sync", direction);
        self.state_tx.send_replace(SyncState::Syncing);

        let mut entities = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let status = match kind {
                EntityKind::Todo => self.sync_kind::<Todo>(direction).await,
                EntityKind::Timer => self.sync_kind::<TaskTimer>(direction).await,
                EntityKind::Note => self.sync_kind::<Note>(direction).await,
            };
            entities.push((kind, status));
        }

        let summary = SyncSummary {
            direction,
            entities,
        };
        let totals = summary.totals();
        tracing::info!(
            "Finished {} sync: {} added, {} updated, {} unchanged, {} skipped, {} failed",
            direction,
            totals.added,
            totals.updated,
            totals.unchanged,
            totals.skipped,
            totals.failed
        );
        self.state_tx.send_replace(if summary.has_failures() {
            SyncState::Error
        } else {
            SyncState::Synced
        });
        SyncOutcome::Completed(summary)
    }

    fn try_begin(&self, kind: EntityKind) -> Option<InFlightGuard<'_>> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        inserted.then_some(InFlightGuard {
            in_flight: &self.in_flight,
            kind,
        })
    }

    async fn sync_kind<T: Entity>(&self, direction: SyncDirection) -> EntitySyncStatus {
        let Some(_guard) = self.try_begin(T::KIND) else {
            tracing::warn!("{} sync already in progress, skipping", T::KIND);
            return EntitySyncStatus::AlreadyRunning;
        };

        match self.sync_entity::<T>(direction).await {
            Ok(report) => {
                tracing::debug!("Synced {} {}: {:?}", T::KIND, direction, report);
                EntitySyncStatus::Synced(report)
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(
                        "{} sync {} interrupted, safe to retry: {}",
                        T::KIND,
                        direction,
                        error
                    );
                } else {
                    tracing::error!("Failed to sync {} {}: {}", T::KIND, direction, error);
                }
                EntitySyncStatus::Failed(error.to_string())
            }
        }
    }

    async fn sync_entity<T: Entity>(&self, direction: SyncDirection) -> Result<SyncReport> {
        let (local, cloud) =
            futures::try_join!(self.factory.local::<T>(), self.factory.cloud::<T>())?;
        let (source, destination) = match direction {
            SyncDirection::ToCloud => (local, cloud),
            SyncDirection::ToLocal => (cloud, local),
        };
        synchronize(source.as_ref(), destination.as_ref()).await
    }
}
