//! Data models for Tasklane

mod entity;
mod note;
mod timer;
mod todo;

pub use entity::{Entity, EntityId, EntityKind};
pub use note::Note;
pub use timer::TaskTimer;
pub use todo::{normalize_tags, NewTodo, Priority, Todo};
