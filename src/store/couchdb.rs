//! CouchDB Storage Backend
//!
//! Minimal client for CouchDB's HTTP API, covering exactly the requests the
//! facade needs: database existence/creation, document CRUD and view queries.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use couchkit::connection::ConnectionConfig;
//! use couchkit::store::{CouchConnection, DocumentStore};
//!
//! async fn example() -> couchkit::store::StoreResult<()> {
//!     let conn = CouchConnection::new(ConnectionConfig::default())?;
//!     let db = conn.open_database("default");
//!
//!     if !db.exists().await? {
//!         db.create().await?;
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::traits::{
    parse_view_name, Document, DocumentStore, SaveResult, StoreConnection, StoreError,
    StoreResult, ViewQuery, ViewRow,
};
use crate::connection::{ConnectionConfig, Credentials};

/// Error body returned by CouchDB on failure
#[derive(Debug, Default, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: String,
}

/// Reply to a successful document write
#[derive(Debug, Deserialize)]
struct WriteReply {
    id: String,
    rev: String,
}

/// Reply to a view query
#[derive(Debug, Deserialize)]
struct ViewReply {
    #[serde(default)]
    rows: Vec<ViewRow>,
}

/// Connection to a CouchDB server
#[derive(Clone)]
pub struct CouchConnection {
    http_client: reqwest::Client,
    base_url: String,
    auth: Option<Credentials>,
    config: ConnectionConfig,
}

impl std::fmt::Debug for CouchConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouchConnection")
            .field("base_url", &self.base_url)
            .field("database", &self.config.database)
            .field("cache", &self.config.cache)
            .finish()
    }
}

impl CouchConnection {
    /// Create a connection from explicit configuration.
    ///
    /// No request is made; the HTTP client is only configured.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if a custom header is invalid or
    /// the HTTP client cannot be built.
    pub fn new(config: ConnectionConfig) -> StoreResult<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(seconds) = config.options.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }

        if !config.options.headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (name, value) in &config.options.headers {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    StoreError::Configuration(format!("Invalid header name '{}': {}", name, e))
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| {
                    StoreError::Configuration(format!("Invalid header value for '{}': {}", name, e))
                })?;
                headers.insert(name, value);
            }
            builder = builder.default_headers(headers);
        }

        let http_client = builder
            .build()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url(),
            auth: config.auth.clone(),
            config,
        })
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:5984`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configuration this connection was built from
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a typed handle on the named database.
    pub fn open_database(&self, name: &str) -> CouchDatabase {
        CouchDatabase {
            name: name.to_string(),
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            auth: self.auth.clone(),
            cache: self
                .config
                .cache
                .then(|| Arc::new(RwLock::new(HashMap::new()))),
        }
    }
}

impl StoreConnection for CouchConnection {
    fn database(&self, name: &str) -> Arc<dyn DocumentStore> {
        Arc::new(self.open_database(name))
    }
}

/// Percent-encode a document id, keeping the `_design/` and `_local/` prefixes readable.
fn document_path(id: &str) -> String {
    for prefix in ["_design/", "_local/"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            return format!("{}{}", prefix, urlencoding::encode(rest));
        }
    }
    urlencoding::encode(id).into_owned()
}

/// Query parameters for a view request; keys are JSON-encoded as CouchDB expects.
fn view_params(query: &ViewQuery) -> StoreResult<Vec<(&'static str, String)>> {
    let mut params = Vec::new();
    if let Some(key) = &query.key {
        let key =
            serde_json::to_string(key).map_err(|e| StoreError::Serialization(e.to_string()))?;
        params.push(("key", key));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    if query.include_docs {
        params.push(("include_docs", "true".to_string()));
    }
    Ok(params)
}

/// One CouchDB database
pub struct CouchDatabase {
    name: String,
    http_client: reqwest::Client,
    base_url: String,
    auth: Option<Credentials>,
    cache: Option<Arc<RwLock<HashMap<String, Document>>>>,
}

impl CouchDatabase {
    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(&self.name))
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.database_url(), document_path(id))
    }

    fn view_url(&self, view: &str) -> StoreResult<String> {
        let (design, name) = parse_view_name(view)?;
        Ok(format!(
            "{}/_design/{}/_view/{}",
            self.database_url(),
            urlencoding::encode(design),
            urlencoding::encode(name)
        ))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.auth {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        }
    }

    /// Send a request and decode a successful JSON reply.
    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Connection(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let reply: ErrorReply = response.json().await.unwrap_or_default();
            return Err(StoreError::from_reply(status.as_u16(), &reply.error, &reply.reason));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Deserialization(format!("Failed to parse response: {}", e)))
    }

    async fn fetch(&self, id: &str) -> StoreResult<Document> {
        let url = self.document_url(id);
        self.send(self.request(Method::GET, &url)).await
    }

    async fn put_document(&self, id: &str, doc: Document) -> StoreResult<SaveResult> {
        let url = self.document_url(id);
        let reply: WriteReply = match self.send(self.request(Method::PUT, &url).json(&doc)).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.forget_on_stale(id, e).await),
        };
        self.remember(&reply, doc).await;
        Ok(SaveResult {
            id: reply.id,
            rev: reply.rev,
        })
    }

    async fn remember(&self, reply: &WriteReply, mut doc: Document) {
        if let Some(cache) = &self.cache {
            doc.insert("_id".to_string(), Value::String(reply.id.clone()));
            doc.insert("_rev".to_string(), Value::String(reply.rev.clone()));
            cache.write().await.insert(reply.id.clone(), doc);
        }
    }

    async fn forget(&self, id: &str) {
        if let Some(cache) = &self.cache {
            cache.write().await.remove(id);
        }
    }

    /// Drop the cached copy of `id` when the server says it is outdated or gone.
    async fn forget_on_stale(&self, id: &str, error: StoreError) -> StoreError {
        if matches!(error, StoreError::Conflict(_) | StoreError::NotFound(_)) {
            self.forget(id).await;
        }
        error
    }
}

#[async_trait]
impl DocumentStore for CouchDatabase {
    fn backend_type(&self) -> &'static str {
        "couchdb"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> StoreResult<bool> {
        let url = self.database_url();
        let response = self
            .request(Method::HEAD, &url)
            .send()
            .await
            .map_err(|e| StoreError::Connection(format!("HTTP request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::from_reply(
                status.as_u16(),
                "",
                status.canonical_reason().unwrap_or_default(),
            )),
        }
    }

    async fn create(&self) -> StoreResult<()> {
        let url = self.database_url();
        let _: Value = self.send(self.request(Method::PUT, &url)).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        if let Some(cache) = &self.cache {
            if let Some(doc) = cache.read().await.get(id) {
                return Ok(doc.clone());
            }
        }

        self.get_current(id).await
    }

    async fn get_current(&self, id: &str) -> StoreResult<Document> {
        let doc = match self.fetch(id).await {
            Ok(doc) => doc,
            Err(e) => return Err(self.forget_on_stale(id, e).await),
        };
        if let Some(cache) = &self.cache {
            cache.write().await.insert(id.to_string(), doc.clone());
        }
        Ok(doc)
    }

    async fn save(&self, doc: Document) -> StoreResult<SaveResult> {
        if let Some(id) = doc.get("_id").and_then(Value::as_str).map(String::from) {
            return self.put_document(&id, doc).await;
        }

        let url = self.database_url();
        let reply: WriteReply = self
            .send(self.request(Method::POST, &url).json(&doc))
            .await?;
        self.remember(&reply, doc).await;
        Ok(SaveResult {
            id: reply.id,
            rev: reply.rev,
        })
    }

    async fn save_revision(&self, id: &str, rev: &str, mut doc: Document) -> StoreResult<SaveResult> {
        doc.insert("_id".to_string(), Value::String(id.to_string()));
        doc.insert("_rev".to_string(), Value::String(rev.to_string()));
        self.put_document(id, doc).await
    }

    async fn merge(&self, id: &str, patch: Document) -> StoreResult<SaveResult> {
        let mut doc = self.fetch(id).await?;
        for (key, value) in patch {
            if key != "_id" && key != "_rev" {
                doc.insert(key, value);
            }
        }
        self.put_document(id, doc).await
    }

    async fn remove(&self, id: &str, rev: &str) -> StoreResult<()> {
        let url = self.document_url(id);
        let sent: StoreResult<Value> = self
            .send(self.request(Method::DELETE, &url).query(&[("rev", rev)]))
            .await;
        if let Err(e) = sent {
            return Err(self.forget_on_stale(id, e).await);
        }
        self.forget(id).await;
        Ok(())
    }

    async fn view(&self, view: &str, query: &ViewQuery) -> StoreResult<Vec<ViewRow>> {
        let url = self.view_url(view)?;
        let params = view_params(query)?;
        let reply: ViewReply = self
            .send(self.request(Method::GET, &url).query(&params))
            .await?;
        Ok(reply.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_path_encoding() {
        assert_eq!(document_path("plain"), "plain");
        assert_eq!(document_path("a b/c"), "a%20b%2Fc");
        assert_eq!(document_path("_design/mine"), "_design/mine");
        assert_eq!(document_path("_local/x y"), "_local/x%20y");
    }

    #[test]
    fn test_urls() {
        let conn = CouchConnection::new(ConnectionConfig::default()).unwrap();
        let db = conn.open_database("my/db");
        assert_eq!(conn.base_url(), "http://127.0.0.1:5984");
        assert_eq!(db.database_url(), "http://127.0.0.1:5984/my%2Fdb");
        assert_eq!(db.document_url("doc 1"), "http://127.0.0.1:5984/my%2Fdb/doc%201");
        assert_eq!(
            db.view_url("user/byUsername").unwrap(),
            "http://127.0.0.1:5984/my%2Fdb/_design/user/_view/byUsername"
        );
        assert!(db.view_url("nodesign").is_err());
    }

    #[test]
    fn test_view_params() {
        assert!(view_params(&ViewQuery::default()).unwrap().is_empty());

        let query = ViewQuery {
            key: Some(json!("rust")),
            limit: Some(5),
            include_docs: true,
        };
        let params = view_params(&query).unwrap();
        assert_eq!(
            params,
            vec![
                ("key", "\"rust\"".to_string()),
                ("limit", "5".to_string()),
                ("include_docs", "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut config = ConnectionConfig::default();
        config
            .options
            .headers
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            CouchConnection::new(config),
            Err(StoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_cache_follows_config() {
        let conn = CouchConnection::new(ConnectionConfig::default()).unwrap();
        assert!(conn.open_database("a").cache.is_none());

        let config = ConnectionConfig {
            cache: true,
            ..ConnectionConfig::default()
        };
        let conn = CouchConnection::new(config).unwrap();
        assert!(conn.open_database("a").cache.is_some());
        assert_eq!(conn.database("a").backend_type(), "couchdb");
    }

    #[test]
    fn test_error_reply_defaults() {
        let reply: ErrorReply = serde_json::from_str("{}").unwrap();
        assert!(reply.error.is_empty());
        let reply: ErrorReply =
            serde_json::from_str(r#"{"error":"not_found","reason":"missing"}"#).unwrap();
        assert!(StoreError::from_reply(404, &reply.error, &reply.reason).is_not_found());
    }
}
