//! In-memory document store
//!
//! Keeps every database in process memory with CouchDB's write rules:
//! generated ids, `N-<hex>` revisions and conflicts on stale revisions.
//! Views cannot run JavaScript here, so they are registered per database as
//! native closures with [`MemoryConnection::define_view`]. View rows come back
//! in CouchDB collation order.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering as KeyOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{
    parse_view_name, Document, DocumentStore, SaveResult, StoreConnection, StoreError,
    StoreResult, ViewQuery, ViewRow,
};

/// Native stand-in for a view's map function: returns the emitted `(key, value)` pairs.
pub type MapFn = Arc<dyn Fn(&Document) -> Vec<(Value, Value)> + Send + Sync>;

#[derive(Default)]
struct MemoryInner {
    databases: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    views: RwLock<HashMap<(String, String), MapFn>>,
    fail_create: AtomicBool,
}

/// Connection to an in-process set of databases
#[derive(Clone, Default)]
pub struct MemoryConnection {
    inner: Arc<MemoryInner>,
}

impl MemoryConnection {
    /// Create an empty connection with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the native map function backing `design/view` in `database`.
    pub async fn define_view<F>(&self, database: &str, view: &str, map: F)
    where
        F: Fn(&Document) -> Vec<(Value, Value)> + Send + Sync + 'static,
    {
        self.inner
            .views
            .write()
            .await
            .insert((database.to_string(), view.to_string()), Arc::new(map));
    }

    /// Make every following `create` fail, as a server refusing the request would.
    pub fn fail_create(&self, fail: bool) {
        self.inner.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Names of the databases that currently exist.
    pub async fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.databases.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Open a typed handle on the named database.
    pub fn open_database(&self, name: &str) -> MemoryDatabase {
        MemoryDatabase {
            name: name.to_string(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl StoreConnection for MemoryConnection {
    fn database(&self, name: &str) -> Arc<dyn DocumentStore> {
        Arc::new(self.open_database(name))
    }
}

/// One in-memory database
pub struct MemoryDatabase {
    name: String,
    inner: Arc<MemoryInner>,
}

impl MemoryDatabase {
    /// Number of documents stored, design documents included.
    pub async fn len(&self) -> StoreResult<usize> {
        let databases = self.inner.databases.read().await;
        Ok(self.docs(&databases)?.len())
    }

    /// Whether the database holds no documents.
    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    fn missing(&self) -> StoreError {
        StoreError::NotFound(format!("Database does not exist: {}", self.name))
    }

    fn docs<'a>(
        &self,
        databases: &'a HashMap<String, BTreeMap<String, Document>>,
    ) -> StoreResult<&'a BTreeMap<String, Document>> {
        databases.get(&self.name).ok_or_else(|| self.missing())
    }

    fn docs_mut<'a>(
        &self,
        databases: &'a mut HashMap<String, BTreeMap<String, Document>>,
    ) -> StoreResult<&'a mut BTreeMap<String, Document>> {
        match databases.get_mut(&self.name) {
            Some(docs) => Ok(docs),
            None => Err(self.missing()),
        }
    }

    /// Store `doc` under `id`, checking `expected_rev` against the current revision.
    async fn write(
        &self,
        id: String,
        expected_rev: Option<String>,
        mut doc: Document,
    ) -> StoreResult<SaveResult> {
        let mut databases = self.inner.databases.write().await;
        let docs = self.docs_mut(&mut databases)?;

        let current = docs.get(&id).and_then(current_rev);
        let generation = match (current, expected_rev) {
            (None, None) => 1,
            (Some(current), Some(expected)) if current == expected => rev_generation(&current) + 1,
            (None, Some(_)) => return Err(StoreError::NotFound(format!("missing: {}", id))),
            _ => return Err(StoreError::Conflict(format!("Document update conflict: {}", id))),
        };

        let rev = format!("{}-{}", generation, uuid::Uuid::new_v4().simple());
        doc.insert("_id".to_string(), Value::String(id.clone()));
        doc.insert("_rev".to_string(), Value::String(rev.clone()));
        docs.insert(id.clone(), doc);

        Ok(SaveResult { id, rev })
    }
}

fn current_rev(doc: &Document) -> Option<String> {
    doc.get("_rev").and_then(Value::as_str).map(String::from)
}

/// Position of a key's type in CouchDB's view collation.
fn collation_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Order view keys the way CouchDB does: null, false, true, numbers, strings,
/// arrays, objects. Numbers compare by value, containers element by element.
/// Strings compare by code point rather than ICU collation.
pub fn collate(a: &Value, b: &Value) -> KeyOrdering {
    collation_rank(a)
        .cmp(&collation_rank(b))
        .then_with(|| match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(KeyOrdering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Array(x), Value::Array(y)) => x
                .iter()
                .zip(y)
                .map(|(l, r)| collate(l, r))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| x.len().cmp(&y.len())),
            (Value::Object(x), Value::Object(y)) => x
                .iter()
                .zip(y)
                .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| collate(lv, rv)))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| x.len().cmp(&y.len())),
            _ => KeyOrdering::Equal,
        })
}

fn rev_generation(rev: &str) -> u64 {
    rev.split('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl DocumentStore for MemoryDatabase {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> StoreResult<bool> {
        Ok(self.inner.databases.read().await.contains_key(&self.name))
    }

    async fn create(&self) -> StoreResult<()> {
        if self.inner.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::PermissionDenied(format!(
                "Not allowed to create database: {}",
                self.name
            )));
        }

        let mut databases = self.inner.databases.write().await;
        if databases.contains_key(&self.name) {
            return Err(StoreError::from_reply(
                412,
                "file_exists",
                "The database could not be created, the file already exists.",
            ));
        }
        databases.insert(self.name.clone(), BTreeMap::new());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        let databases = self.inner.databases.read().await;
        self.docs(&databases)?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("missing: {}", id)))
    }

    async fn save(&self, doc: Document) -> StoreResult<SaveResult> {
        let id = match doc.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let rev = current_rev(&doc);
        self.write(id, rev, doc).await
    }

    async fn save_revision(&self, id: &str, rev: &str, doc: Document) -> StoreResult<SaveResult> {
        self.write(id.to_string(), Some(rev.to_string()), doc).await
    }

    async fn merge(&self, id: &str, patch: Document) -> StoreResult<SaveResult> {
        let mut doc = self.get(id).await?;
        let rev = current_rev(&doc);
        for (key, value) in patch {
            if key != "_id" && key != "_rev" {
                doc.insert(key, value);
            }
        }
        self.write(id.to_string(), rev, doc).await
    }

    async fn remove(&self, id: &str, rev: &str) -> StoreResult<()> {
        let mut databases = self.inner.databases.write().await;
        let docs = self.docs_mut(&mut databases)?;

        let current = docs
            .get(id)
            .map(current_rev)
            .ok_or_else(|| StoreError::NotFound(format!("missing: {}", id)))?;
        if current.as_deref() != Some(rev) {
            return Err(StoreError::Conflict(format!("Document update conflict: {}", id)));
        }

        docs.remove(id);
        Ok(())
    }

    async fn view(&self, view: &str, query: &ViewQuery) -> StoreResult<Vec<ViewRow>> {
        let (design, _) = parse_view_name(view)?;

        let map = self
            .inner
            .views
            .read()
            .await
            .get(&(self.name.clone(), view.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("missing_named_view: {}", view)))?;

        let databases = self.inner.databases.read().await;
        let docs = self.docs(&databases)?;
        if !docs.contains_key(&format!("_design/{}", design)) {
            return Err(StoreError::NotFound(format!("missing design document: {}", design)));
        }

        let mut rows = Vec::new();
        for (id, doc) in docs.iter().filter(|(id, _)| !id.starts_with("_design/")) {
            for (key, value) in map(doc) {
                if query.key.as_ref().is_some_and(|wanted| *wanted != key) {
                    continue;
                }
                rows.push(ViewRow {
                    id: Some(id.clone()),
                    key,
                    value,
                    doc: query.include_docs.then(|| doc.clone()),
                });
            }
        }

        rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }
}
