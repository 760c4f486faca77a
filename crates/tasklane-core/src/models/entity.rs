//! Shared identity and timestamp contract for synchronized records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier shared by the local and cloud copies of a record.
///
/// Freshly created records get a UUID v7 (time-sortable); ids read back from
/// storage are kept verbatim, whatever their shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new unique id using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The three synchronized collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Todo,
    Timer,
    Note,
}

impl EntityKind {
    /// Every kind, in the order sync passes visit them
    pub const ALL: [Self; 3] = [Self::Todo, Self::Timer, Self::Note];

    /// Key under which the local store keeps the JSON array for this kind
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::Todo => "todos",
            Self::Timer => "timers",
            Self::Note => "notes",
        }
    }

    /// Name of the per-user cloud collection for this kind
    pub const fn collection(self) -> &'static str {
        self.storage_key()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// A persisted record that can be synchronized between stores.
///
/// `id` joins the local and cloud copies; `updated_at` alone decides which
/// copy wins a merge.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    /// Stand-in for a stored record that could not be decoded.
    ///
    /// Placeholders carry epoch timestamps so that any real copy of the same
    /// id wins against them.
    fn placeholder(id: EntityId) -> Self;

    /// Whether this record is a decode placeholder rather than user data
    fn is_placeholder(&self) -> bool {
        self.created_at() == DateTime::<Utc>::UNIX_EPOCH
            && self.updated_at() == DateTime::<Utc>::UNIX_EPOCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_unique() {
        assert_ne!(EntityId::new(), EntityId::new());
    }

    #[test]
    fn entity_id_serializes_as_plain_string() {
        let id = EntityId::from("todo-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"todo-1\"");
        let parsed: EntityId = serde_json::from_str("\"todo-1\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn kinds_map_to_fixed_keys() {
        assert_eq!(EntityKind::Todo.storage_key(), "todos");
        assert_eq!(EntityKind::Timer.storage_key(), "timers");
        assert_eq!(EntityKind::Note.collection(), "notes");
        assert_eq!(EntityKind::Timer.to_string(), "timers");
    }
}
