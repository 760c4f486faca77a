//! Application configuration.
//!
//! `AppConfig` describes where local data lives and, optionally, which
//! Supabase project backs the cloud store. Everything is public and safe to
//! ship; secrets never belong here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_DOCUMENTS_TABLE: &str = "documents";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_NOTE_AUTOSAVE_MS: u64 = 1500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// libsql database file; `None` keeps local data in memory
    #[serde(default)]
    pub local_db_path: Option<PathBuf>,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default = "default_documents_table")]
    pub documents_table: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Quiet period before an edited note is saved
    #[serde(default = "default_note_autosave_ms")]
    pub note_autosave_ms: u64,
}

/// Validated cloud endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    pub supabase_url: String,
    pub anon_key: String,
    pub documents_table: String,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            local_db_path: None,
            supabase_url: None,
            supabase_anon_key: None,
            documents_table: default_documents_table(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            note_autosave_ms: DEFAULT_NOTE_AUTOSAVE_MS,
        }
    }
}

impl AppConfig {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config: {error}")))
    }

    /// Read and parse a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let payload = std::fs::read_to_string(path)?;
        let config = Self::from_json(&payload)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn note_autosave_delay(&self) -> Duration {
        Duration::from_millis(self.note_autosave_ms)
    }

    /// Cloud settings, or `None` when the app runs local-only.
    ///
    /// The URL and anon key must be configured together.
    pub fn cloud_settings(&self) -> Result<Option<CloudSettings>> {
        let url = normalize_text_option(self.supabase_url.clone());
        let anon_key = normalize_text_option(self.supabase_anon_key.clone());

        match (url, anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => {
                if !is_http_url(&url) {
                    return Err(Error::Config(format!(
                        "supabase_url must be an http(s) URL, got {url}"
                    )));
                }
                let documents_table = normalize_text_option(Some(self.documents_table.clone()))
                    .ok_or_else(|| Error::Config("documents_table must not be empty".to_string()))?;
                Ok(Some(CloudSettings {
                    supabase_url: url.trim_end_matches('/').to_string(),
                    anon_key,
                    documents_table,
                    request_timeout: self.request_timeout(),
                }))
            }
            (Some(_), None) => Err(Error::Config(
                "supabase_anon_key is required when supabase_url is set".to_string(),
            )),
            (None, Some(_)) => Err(Error::Config(
                "supabase_url is required when supabase_anon_key is set".to_string(),
            )),
        }
    }
}

fn default_documents_table() -> String {
    DEFAULT_DOCUMENTS_TABLE.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_note_autosave_ms() -> u64 {
    DEFAULT_NOTE_AUTOSAVE_MS
}
