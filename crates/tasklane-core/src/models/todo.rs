//! Todo model

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind};
use crate::util::next_timestamp;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("Invalid regex"));

/// Todo priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A todo item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique identifier
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    #[serde(default)]
    pub priority: Priority,
    /// Normalized tags, see [`normalize_tags`]
    #[serde(default)]
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Field values for a todo that has not been created yet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTodo {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

impl Todo {
    /// Create a new, incomplete todo with the given title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self::from_new(NewTodo::new(title))
    }

    /// Create a todo from prepared field values, assigning id and timestamps
    #[must_use]
    pub fn from_new(new: NewTodo) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            title: new.title,
            description: new.description,
            is_completed: false,
            priority: new.priority,
            tags: normalize_tags(new.tags),
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_completed(&mut self, completed: bool) {
        self.is_completed = completed;
        self.touch();
    }

    pub fn toggle_completed(&mut self) {
        self.set_completed(!self.is_completed);
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.touch();
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_tags(tags.into_iter().map(Into::into));
        self.touch();
    }

    pub fn set_due_date(&mut self, due_date: Option<DateTime<Utc>>) {
        self.due_date = due_date;
        self.touch();
    }

    /// Incomplete and past its due date
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due_date.is_some_and(|due| due < now)
    }

    fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
    }
}

impl Entity for Todo {
    const KIND: EntityKind = EntityKind::Todo;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn placeholder(id: EntityId) -> Self {
        Self {
            id,
            title: "Unreadable todo".to_string(),
            description: None,
            is_completed: false,
            priority: Priority::default(),
            tags: Vec::new(),
            due_date: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Normalize todo tags.
///
/// A leading `#` is stripped, tags must match `[a-zA-Z][a-zA-Z0-9_-]*`, and
/// the result is lowercased and deduplicated in first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter_map(|tag| {
            let tag = tag.as_ref().trim().trim_start_matches('#');
            TAG_PATTERN
                .is_match(tag)
                .then(|| tag.to_lowercase())
        })
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_todo_new() {
        let todo = Todo::new("Buy milk");
        assert_eq!(todo.title, "Buy milk");
        assert!(!todo.is_completed);
        assert_eq!(todo.priority, Priority::Medium);
        assert_eq!(todo.created_at, todo.updated_at);
        assert!(!todo.is_placeholder());
    }

    #[test]
    fn test_mutators_stamp_updated_at() {
        let mut todo = Todo::new("Buy milk");
        let before = todo.updated_at;
        todo.toggle_completed();
        assert!(todo.is_completed);
        assert!(todo.updated_at >= before);
        assert_eq!(todo.created_at, before);
    }

    #[test]
    fn test_json_shape_is_camel_case() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let todo = Todo {
            id: EntityId::from("1"),
            title: "Buy milk".to_string(),
            description: None,
            is_completed: true,
            priority: Priority::High,
            tags: vec!["home".to_string()],
            due_date: None,
            created_at: created,
            updated_at: created,
        };

        let value = serde_json::to_value(&todo).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "1",
                "title": "Buy milk",
                "description": null,
                "isCompleted": true,
                "priority": "high",
                "tags": ["home"],
                "dueDate": null,
                "createdAt": "2024-03-01T12:00:00Z",
                "updatedAt": "2024-03-01T12:00:00Z"
            })
        );
    }

    #[test]
    fn test_json_round_trip_keeps_every_field() {
        let todo = Todo::from_new(
            NewTodo::new("File taxes")
                .description("before April")
                .priority(Priority::High)
                .tags(["Finance", "#urgent"])
                .due_date(Utc::now() + Duration::days(3)),
        );
        let encoded = serde_json::to_string(&todo).unwrap();
        let decoded: Todo = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, todo);
    }

    #[test]
    fn test_missing_optional_fields_decode_to_defaults() {
        let decoded: Todo = serde_json::from_str(
            r#"{"id":"7","title":"t","isCompleted":false,
                "createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(decoded.priority, Priority::Medium);
        assert!(decoded.tags.is_empty());
        assert_eq!(decoded.description, None);
        assert_eq!(decoded.due_date, None);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["#Home", "home", "work_2", "2fast", "", "a-b"]);
        assert_eq!(tags, vec!["home", "work_2", "a-b"]);
    }

    #[test]
    fn test_is_overdue() {
        let now = Utc::now();
        let mut todo = Todo::from_new(NewTodo::new("late").due_date(now - Duration::hours(1)));
        assert!(todo.is_overdue(now));
        todo.set_completed(true);
        assert!(!todo.is_overdue(now));
        assert!(!Todo::new("no due date").is_overdue(now));
    }

    #[test]
    fn test_placeholder_is_detected() {
        let placeholder = Todo::placeholder(EntityId::from("broken"));
        assert!(placeholder.is_placeholder());
        assert_eq!(placeholder.id.as_str(), "broken");
    }
}
