//! Timer service operations

use chrono::Utc;

use super::EntityService;
use crate::error::{Error, Result};
use crate::models::{EntityId, TaskTimer};
use crate::repository::{BulkReport, TimerRepositoryExt};

impl EntityService<TaskTimer> {
    /// Create a timer that starts running immediately
    pub async fn start_timer(&self, name: impl Into<String>) -> Result<TaskTimer> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("timer name must not be empty".to_string()));
        }
        self.add(TaskTimer::new(name)).await
    }

    pub async fn stop_timer(&self, id: &EntityId) -> Result<TaskTimer> {
        self.modify(id, |timer| {
            timer.stop(Utc::now());
        })
        .await
    }

    pub async fn toggle_timer(&self, id: &EntityId) -> Result<TaskTimer> {
        let _guard = self.guard().await;
        let timer = self.repository()?.toggle_running(id).await?;
        self.upsert_cached(timer.clone());
        Ok(timer)
    }

    pub async fn stop_all_running(&self) -> Result<BulkReport> {
        let _guard = self.guard().await;
        let report = self.repository()?.stop_all_running().await?;
        self.reload_locked().await?;
        Ok(report)
    }

    /// Cached timers without an end time
    pub fn running(&self) -> Vec<TaskTimer> {
        self.items()
            .iter()
            .filter(|timer| timer.is_running())
            .cloned()
            .collect()
    }
}
