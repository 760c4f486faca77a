//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind};
use crate::util::next_timestamp;

/// A free-text note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: EntityId,
    pub title: String,
    /// Plain text content
    pub content: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a new note with the given title and content
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = next_timestamp(self.updated_at);
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = next_timestamp(self.updated_at);
    }

    /// Replace title and content as one edit
    pub fn edit(&mut self, title: impl Into<String>, content: impl Into<String>) {
        self.title = title.into();
        self.content = content.into();
        self.updated_at = next_timestamp(self.updated_at);
    }

    /// Title, or the first content line when the title is blank, truncated to
    /// `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }

    /// Check if the note has neither title nor content (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }
}

impl Entity for Note {
    const KIND: EntityKind = EntityKind::Note;

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
            title: "Unreadable note".to_string(),
            content: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}
