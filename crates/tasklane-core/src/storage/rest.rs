//! HTTP document store backed by a PostgREST `documents` table
//!
//! Every document is one row `(user_id, collection, id, data)`, with row
//! level security restricting each user to their own rows.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{BatchWrite, CollectionPath, Document, DocumentStore};
use crate::auth::SessionState;
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Cloud document store reached over HTTP
#[derive(Clone)]
pub struct RestDocumentStore {
    table_url: String,
    anon_key: String,
    client: Client,
    session: SessionState,
}

#[derive(Debug, Serialize)]
struct DocumentRow<'a> {
    user_id: &'a str,
    collection: &'a str,
    id: &'a str,
    data: &'a Value,
}

#[derive(Debug, Deserialize)]
struct StoredRow {
    id: String,
    data: Value,
}

impl RestDocumentStore {
    pub fn new(
        base_url: &str,
        table: &str,
        anon_key: impl Into<String>,
        timeout: Duration,
        session: SessionState,
    ) -> Result<Self> {
        let table_url = table_url(base_url, table)?;
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| Error::Config("anon key must not be empty".to_string()))?;

        Ok(Self {
            table_url,
            anon_key,
            client: Client::builder().timeout(timeout).build()?,
            session,
        })
    }

    /// Attach credentials of the current session.
    ///
    /// Expired tokens are rejected here rather than by the server; callers
    /// refresh the session through the auth client before cloud passes.
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let session = self
            .session
            .session()
            .filter(|session| !session.is_expired())
            .ok_or(Error::NotAuthenticated)?;
        Ok(request
            .header("apikey", &self.anon_key)
            .bearer_auth(session.access_token)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    fn scoped(request: RequestBuilder, path: &CollectionPath) -> RequestBuilder {
        request.query(&[
            ("user_id", format!("eq.{}", path.user_id())),
            ("collection", format!("eq.{}", path.collection())),
        ])
    }

    async fn fetch_rows(&self, request: RequestBuilder) -> Result<Vec<StoredRow>> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<Vec<StoredRow>>().await?)
    }

    async fn upsert(&self, path: &CollectionPath, documents: &[(String, Value)]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let rows: Vec<DocumentRow<'_>> = documents
            .iter()
            .map(|(id, data)| DocumentRow {
                user_id: path.user_id(),
                collection: path.collection(),
                id,
                data,
            })
            .collect();

        let request = self
            .authorized(self.client.post(&self.table_url))?
            .query(&[("on_conflict", "user_id,collection,id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        check_status(request.send().await?).await?;
        Ok(())
    }

    async fn delete_ids(&self, path: &CollectionPath, ids: &[String]) -> Result<Vec<StoredRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = Self::scoped(self.authorized(self.client.delete(&self.table_url))?, path)
            .query(&[("id", in_filter(ids)), ("select", "id,data".to_string())])
            .header("Prefer", "return=representation");
        self.fetch_rows(request).await
    }
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>> {
        let request = Self::scoped(self.authorized(self.client.get(&self.table_url))?, path)
            .query(&[("select", "id,data")]);
        let rows = self.fetch_rows(request).await?;
        tracing::debug!("Fetched {} documents from {}", rows.len(), path);
        Ok(rows
            .into_iter()
            .map(|row| Document {
                id: row.id,
                data: row.data,
            })
            .collect())
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Value>> {
        let request = Self::scoped(self.authorized(self.client.get(&self.table_url))?, path)
            .query(&[("id", format!("eq.{id}")), ("select", "id,data".to_string())]);
        let rows = self.fetch_rows(request).await?;
        Ok(rows.into_iter().next().map(|row| row.data))
    }

    async fn set(&self, path: &CollectionPath, id: &str, data: Value) -> Result<()> {
        self.upsert(path, &[(id.to_string(), data)]).await
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<bool> {
        let deleted = self.delete_ids(path, &[id.to_string()]).await?;
        Ok(!deleted.is_empty())
    }

    /// Upserts go out as one bulk request and deletes as another; each
    /// request is atomic on the server, the pair is not.
    async fn commit(&self, path: &CollectionPath, writes: Vec<BatchWrite>) -> Result<()> {
        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for write in writes {
            match write {
                BatchWrite::Set { id, data } => upserts.push((id, data)),
                BatchWrite::Delete { id } => deletes.push(id),
            }
        }

        self.upsert(path, &upserts).await?;
        self.delete_ids(path, &deletes).await?;
        Ok(())
    }
}

fn table_url(base_url: &str, table: &str) -> Result<String> {
    let base = normalize_text_option(Some(base_url.to_string()))
        .ok_or_else(|| Error::Config("cloud URL must not be empty".to_string()))?;
    if !is_http_url(&base) {
        return Err(Error::Config(
            "cloud URL must include http:// or https://".to_string(),
        ));
    }
    let table = table.trim();
    if table.is_empty() {
        return Err(Error::Config("documents table must not be empty".to_string()));
    }

    let base = base.trim_end_matches('/');
    let base = base.strip_suffix("/rest/v1").unwrap_or(base);
    Ok(format!("{base}/rest/v1/{table}"))
}

/// PostgREST `in.(...)` filter with every id double-quoted
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::NotAuthenticated);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct RestErrorBody {
    message: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RestErrorBody>(body) {
        if let Some(message) = payload.message {
            return match payload.hint {
                Some(hint) => format!("{} - {} ({})", message.trim(), hint.trim(), status.as_u16()),
                None => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::models::EntityKind;

    #[test]
    fn table_url_is_normalized() {
        assert_eq!(
            table_url("https://demo.supabase.co/", "documents").unwrap(),
            "https://demo.supabase.co/rest/v1/documents"
        );
        assert_eq!(
            table_url("https://demo.supabase.co/rest/v1", "documents").unwrap(),
            "https://demo.supabase.co/rest/v1/documents"
        );
    }

    #[test]
    fn table_url_rejects_invalid_values() {
        assert!(table_url("", "documents").is_err());
        assert!(table_url("demo.supabase.co", "documents").is_err());
        assert!(table_url("https://demo.supabase.co", " ").is_err());
    }

    #[test]
    fn in_filter_quotes_ids() {
        let ids = vec!["a".to_string(), "b,c".to_string(), "d\"e".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("a","b,c","d\"e")"#);
    }

    #[test]
    fn parse_api_error_uses_message_and_hint() {
        let message = parse_api_error(
            StatusCode::CONFLICT,
            r#"{"message": "duplicate key", "hint": "use upsert"}"#,
        );
        assert_eq!(message, "duplicate key - use upsert (409)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[tokio::test]
    async fn requests_without_session_are_not_authenticated() {
        let store = RestDocumentStore::new(
            "https://demo.supabase.co",
            "documents",
            "anon",
            Duration::from_secs(1),
            SessionState::new(),
        )
        .unwrap();
        let path = CollectionPath::for_user("u1", EntityKind::Todo);

        let error = store.list(&path).await.unwrap_err();
        assert!(matches!(error, Error::NotAuthenticated));
    }

    #[tokio::test]
    async fn expired_sessions_are_not_sent() {
        let mut session = crate::test_support::session_for(AuthUser::new("u1", None));
        session.expires_at = chrono::Utc::now().timestamp() - 10;
        let store = RestDocumentStore::new(
            // Unreachable: reaching the network would surface an HTTP error.
            "http://127.0.0.1:9",
            "documents",
            "anon",
            Duration::from_secs(1),
            SessionState::with_session(session),
        )
        .unwrap();
        let path = CollectionPath::for_user("u1", EntityKind::Todo);

        let error = store.get(&path, "todo-1").await.unwrap_err();
        assert!(matches!(error, Error::NotAuthenticated));
    }
}
