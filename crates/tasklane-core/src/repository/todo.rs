//! Todo-specific queries and bulk operations

use async_trait::async_trait;

use super::{BulkReport, Repository};
use crate::error::{Error, Result};
use crate::models::{Entity, EntityId, Todo};

#[async_trait]
pub trait TodoRepositoryExt: Repository<Todo> {
    async fn completed(&self) -> Result<Vec<Todo>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|todo| todo.is_completed)
            .collect())
    }

    async fn pending(&self) -> Result<Vec<Todo>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|todo| !todo.is_completed)
            .collect())
    }

    /// Flip one todo's completion flag and persist it
    async fn toggle_completion(&self, id: &EntityId) -> Result<Todo> {
        let mut todo = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        todo.toggle_completed();
        self.update(&todo).await?;
        Ok(todo)
    }

    async fn mark_all_complete(&self) -> Result<BulkReport> {
        let updates: Vec<Todo> = self
            .pending()
            .await?
            .into_iter()
            .filter(|todo| !todo.is_placeholder())
            .map(|mut todo| {
                todo.set_completed(true);
                todo
            })
            .collect();
        Ok(self.write_batch(updates, Vec::new()).await)
    }

    async fn delete_completed(&self) -> Result<BulkReport> {
        let deletes = self
            .completed()
            .await?
            .into_iter()
            .map(|todo| todo.id)
            .collect();
        Ok(self.write_batch(Vec::new(), deletes).await)
    }
}

impl<R: Repository<Todo> + ?Sized> TodoRepositoryExt for R {}
