//! Storage backends behind the repositories
//!
//! The local side is a string-keyed, string-valued store; the cloud side is a
//! per-user document collection store.

mod document;
mod kv;
mod libsql_store;
mod migrations;
mod rest;

pub use document::{BatchWrite, CollectionPath, Document, DocumentStore, MemoryDocumentStore};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use libsql_store::LibSqlKeyValueStore;
pub use rest::RestDocumentStore;
