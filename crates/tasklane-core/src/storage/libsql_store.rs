//! libSQL-backed key-value store

use std::path::Path;

use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use tokio::sync::Mutex;

use super::kv::KeyValueStore;
use super::migrations;
use crate::error::Result;

/// Key-value store persisted in a local libSQL database file
pub struct LibSqlKeyValueStore {
    // Keeps the database handle alive for the lifetime of the connection.
    _db: Database,
    conn: Mutex<Connection>,
}

impl LibSqlKeyValueStore {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let path_str = path.to_string_lossy().to_string();
        Self::open_with(&path_str).await
    }

    /// Open an in-memory store (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_with(":memory:").await
    }

    async fn open_with(location: &str) -> Result<Self> {
        let db = Builder::new_local(location).build().await?;
        let conn = db.connect()?;

        // Not every pragma is honoured for in-memory databases.
        conn.execute("PRAGMA journal_mode = WAL;", ()).await.ok();
        conn.execute("PRAGMA synchronous = NORMAL;", ()).await.ok();

        migrations::run(&conn).await?;
        tracing::debug!("Opened local key-value store at {}", location);

        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl KeyValueStore for LibSqlKeyValueStore {
    async fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        migrations::run(&conn).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query("SELECT value FROM kv_store WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
            [key, value],
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv_store WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}
