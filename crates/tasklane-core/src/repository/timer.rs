//! Timer-specific queries and bulk operations

use async_trait::async_trait;
use chrono::Utc;

use super::{BulkReport, Repository};
use crate::error::{Error, Result};
use crate::models::{EntityId, TaskTimer};

#[async_trait]
pub trait TimerRepositoryExt: Repository<TaskTimer> {
    async fn running(&self) -> Result<Vec<TaskTimer>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(TaskTimer::is_running)
            .collect())
    }

    /// Stop every running timer at the same instant
    async fn stop_all_running(&self) -> Result<BulkReport> {
        let now = Utc::now();
        let updates: Vec<TaskTimer> = self
            .running()
            .await?
            .into_iter()
            .map(|mut timer| {
                timer.stop(now);
                timer
            })
            .collect();
        Ok(self.write_batch(updates, Vec::new()).await)
    }

    /// Stop a running timer, or restart a stopped one
    async fn toggle_running(&self, id: &EntityId) -> Result<TaskTimer> {
        let mut timer = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        timer.toggle(Utc::now());
        self.update(&timer).await?;
        Ok(timer)
    }
}

impl<R: Repository<TaskTimer> + ?Sized> TimerRepositoryExt for R {}
