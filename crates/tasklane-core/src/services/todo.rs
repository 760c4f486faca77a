//! Todo service operations

use super::EntityService;
use crate::error::{Error, Result};
use crate::models::{EntityId, NewTodo, Todo};
use crate::repository::{BulkReport, TodoRepositoryExt};

impl EntityService<Todo> {
    pub async fn add_todo(&self, new: NewTodo) -> Result<Todo> {
        if new.title.trim().is_empty() {
            return Err(Error::InvalidInput("todo title must not be empty".to_string()));
        }
        self.add(Todo::from_new(new)).await
    }

    pub async fn toggle_completion(&self, id: &EntityId) -> Result<Todo> {
        let _guard = self.guard().await;
        let todo = self.repository()?.toggle_completion(id).await?;
        self.upsert_cached(todo.clone());
        Ok(todo)
    }

    /// Cached todos that are done
    pub fn completed(&self) -> Vec<Todo> {
        self.items()
            .iter()
            .filter(|todo| todo.is_completed)
            .cloned()
            .collect()
    }

    /// Cached todos still open
    pub fn pending(&self) -> Vec<Todo> {
        self.items()
            .iter()
            .filter(|todo| !todo.is_completed)
            .cloned()
            .collect()
    }

    pub async fn mark_all_complete(&self) -> Result<BulkReport> {
        let _guard = self.guard().await;
        let report = self.repository()?.mark_all_complete().await?;
        self.reload_locked().await?;
        Ok(report)
    }

    pub async fn delete_completed(&self) -> Result<BulkReport> {
        let _guard = self.guard().await;
        let report = self.repository()?.delete_completed().await?;
        self.reload_locked().await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::SessionState;
    use crate::error::Error;
    use crate::models::{NewTodo, Priority};
    use crate::services::TodoService;
    use crate::test_support::memory_factory;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn todo_workflow() {
        let service = TodoService::new(memory_factory(&SessionState::new()));
        service.initialize().await.unwrap();

        let groceries = service
            .add_todo(
                NewTodo::new("Groceries")
                    .priority(Priority::High)
                    .tags(["home", "Errands"]),
            )
            .await
            .unwrap();
        service.add_todo(NewTodo::new("Taxes")).await.unwrap();
        assert_eq!(groceries.tags, vec!["home", "errands"]);

        let toggled = service.toggle_completion(&groceries.id).await.unwrap();
        assert!(toggled.is_completed);
        assert_eq!(service.completed(), vec![toggled]);
        assert_eq!(service.pending().len(), 1);

        let report = service.mark_all_complete().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(service.pending().is_empty());

        let report = service.delete_completed().await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert!(service.items().is_empty());
    }

    #[tokio::test]
    async fn blank_titles_are_rejected() {
        let service = TodoService::new(memory_factory(&SessionState::new()));
        service.initialize().await.unwrap();
        let result = service.add_todo(NewTodo::new("   ")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(service.items().is_empty());
    }
}
