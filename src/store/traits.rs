//! Document Store Traits
//!
//! Defines the seam between the facade and the database client: a
//! per-database [`DocumentStore`] and the [`StoreConnection`] that hands
//! them out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A stored document: string-keyed JSON fields, `_id` and `_rev` included.
pub type Document = serde_json::Map<String, Value>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The server could not be reached or the request did not complete
    #[error("Connection error: {0}")]
    Connection(String),

    /// Document (or database) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Revision conflict on write
    #[error("Document update conflict: {0}")]
    Conflict(String),

    /// Database does not exist
    #[error("Database does not exist: {0}")]
    DatabaseMissing(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Any other error reported by the server
    #[error("Server error {status} ({error}): {reason}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Short error name, e.g. `file_exists`
        error: String,
        /// Human readable reason
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Map a CouchDB-style `{error, reason}` reply onto a store error.
    pub fn from_reply(status: u16, error: &str, reason: &str) -> Self {
        let reason = if reason.is_empty() { error } else { reason };
        match (status, error) {
            (_, "not_found") | (404, _) => StoreError::NotFound(reason.to_string()),
            (_, "conflict") | (409, _) => StoreError::Conflict(reason.to_string()),
            (_, "unauthorized") | (_, "forbidden") | (401, _) | (403, _) => {
                StoreError::PermissionDenied(reason.to_string())
            }
            _ => StoreError::Server {
                status,
                error: error.to_string(),
                reason: reason.to_string(),
            },
        }
    }

    /// Whether this error means the requested document is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Identifier and revision assigned by a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    /// Document id
    pub id: String,
    /// New revision token
    pub rev: String,
}

/// One row of a view result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    /// Id of the emitting document (absent for reduced rows)
    #[serde(default)]
    pub id: Option<String>,
    /// Emitted key
    #[serde(default)]
    pub key: Value,
    /// Emitted value
    #[serde(default)]
    pub value: Value,
    /// Full document, when requested with `include_docs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

/// Options for querying a view
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    /// Only return rows emitted with this key
    pub key: Option<Value>,
    /// Maximum number of rows to return
    pub limit: Option<usize>,
    /// Attach the emitting document to every row
    pub include_docs: bool,
}

impl ViewQuery {
    /// Query restricted to a single key.
    pub fn with_key(key: impl Into<Value>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// Split a `design/view` name into its two parts.
pub fn parse_view_name(view: &str) -> StoreResult<(&str, &str)> {
    match view.split_once('/') {
        Some((design, name)) if !design.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((design, name))
        }
        _ => Err(StoreError::Configuration(format!(
            "View name must look like 'design/view': {}",
            view
        ))),
    }
}

/// Operations available on one database
///
/// Every method is a single request against the store; nothing is retried.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the backend type name (e.g., "couchdb", "memory")
    fn backend_type(&self) -> &'static str;

    /// Name of the database this store is bound to
    fn name(&self) -> &str;

    /// Check whether the database exists
    async fn exists(&self) -> StoreResult<bool>;

    /// Create the database
    async fn create(&self) -> StoreResult<()>;

    /// Fetch a document by id
    async fn get(&self, id: &str) -> StoreResult<Document>;

    /// Fetch a document from the server itself, skipping any local cache.
    ///
    /// Used wherever a revision is read in order to write with it.
    async fn get_current(&self, id: &str) -> StoreResult<Document> {
        self.get(id).await
    }

    /// Save a document; uses its `_id` when present, otherwise the store assigns one
    async fn save(&self, doc: Document) -> StoreResult<SaveResult>;

    /// Save a document over an existing revision
    async fn save_revision(&self, id: &str, rev: &str, doc: Document) -> StoreResult<SaveResult>;

    /// Overlay the top-level fields of `patch` onto the stored document
    async fn merge(&self, id: &str, patch: Document) -> StoreResult<SaveResult>;

    /// Delete a document at the given revision
    async fn remove(&self, id: &str, rev: &str) -> StoreResult<()>;

    /// Query a `design/view`
    async fn view(&self, view: &str, query: &ViewQuery) -> StoreResult<Vec<ViewRow>>;
}

/// A connection that binds stores to database names
pub trait StoreConnection: Send + Sync {
    /// Get a store for the named database (no request is made)
    fn database(&self, name: &str) -> Arc<dyn DocumentStore>;
}
