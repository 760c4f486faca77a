//! tasklane-core - Core library for Tasklane
//!
//! This crate contains the entity models, the local and cloud repositories,
//! the last-write-wins synchronization engine and the cached services used
//! by every Tasklane front end.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use context::AppContext;
pub use error::{Error, Result};
pub use models::{Entity, EntityId, EntityKind, NewTodo, Note, Priority, TaskTimer, Todo};
pub use repository::{Backend, BulkReport, Repository, RepositoryFactory};
pub use services::{NoteAutosave, NoteService, TimerService, TodoService};
pub use state::SyncState;
pub use sync::{SyncDirection, SyncEngine, SyncOutcome, SyncReport};
