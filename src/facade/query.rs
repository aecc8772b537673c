//! View queries and bulk document processing.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::entry::{remove_entry, update_entry};
use crate::connection::Database;
use crate::store::{Document, StoreError, StoreResult, ViewQuery, ViewRow};

/// View queried by [`list_all`]
pub const LIST_ALL_VIEW: &str = "user/byUsername";

/// Design document holding the temporary view used by [`process_documents`]
pub const PROCESS_DESIGN: &str = "bulk_process";
/// View inside [`PROCESS_DESIGN`]
pub const PROCESS_VIEW: &str = "all";
const PROCESS_MAP: &str = "function (doc) { emit(doc._id, doc); }";

/// Design document holding the tag index used by [`search`]
pub const SEARCH_DESIGN: &str = "tags";
/// View inside [`SEARCH_DESIGN`]
pub const SEARCH_VIEW: &str = "by_tag";
const SEARCH_MAP: &str = "function (doc) { \
if (doc.attributes && Array.isArray(doc.attributes.tags)) { \
doc.attributes.tags.forEach(function (tag) { emit(tag, doc); }); \
} }";

/// List every row of the `user/byUsername` view.
pub async fn list_all(db: &Database) -> StoreResult<Vec<ViewRow>> {
    list(db, LIST_ALL_VIEW).await
}

/// List every row of a `design/view`.
pub async fn list(db: &Database, view: &str) -> StoreResult<Vec<ViewRow>> {
    list_with(db, view, &ViewQuery::default()).await
}

/// Query a `design/view` with explicit options.
pub async fn list_with(db: &Database, view: &str, query: &ViewQuery) -> StoreResult<Vec<ViewRow>> {
    db.store().view(view, query).await
}

/// Create or overwrite `_design/<design>` so that it holds a single view.
pub async fn put_view(db: &Database, design: &str, view: &str, map: &str) -> StoreResult<bool> {
    let id = format!("_design/{}", design);

    let mut views = Document::new();
    views.insert(view.to_string(), json!({ "map": map }));

    let mut doc = Document::new();
    doc.insert("_id".to_string(), Value::String(id.clone()));
    doc.insert("language".to_string(), json!("javascript"));
    doc.insert("views".to_string(), Value::Object(views));

    update_entry(db, &id, doc).await
}

/// Define a view unless `_design/<design>` already holds it with `map`.
///
/// Returns whether the design document was written.
pub async fn ensure_view(db: &Database, design: &str, view: &str, map: &str) -> StoreResult<bool> {
    let id = format!("_design/{}", design);
    match db.store().get(&id).await {
        Ok(current) => {
            let stored = current
                .get("views")
                .and_then(|views| views.get(view))
                .and_then(|definition| definition.get("map"))
                .and_then(Value::as_str);
            if stored == Some(map) {
                debug!(database = db.name(), design, view, "view already defined");
                return Ok(false);
            }
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    put_view(db, design, view, map).await
}

/// A document [`process_documents`] could not write back
#[derive(Debug)]
pub struct ProcessFailure {
    /// Id of the document (empty if the row carried none)
    pub id: String,
    /// What went wrong
    pub error: StoreError,
}

/// Outcome of [`process_documents`]
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Documents written back successfully
    pub processed: usize,
    /// Documents that failed, in view order
    pub failures: Vec<ProcessFailure>,
    /// Set when the temporary view could not be deleted afterwards
    pub cleanup_error: Option<StoreError>,
}

impl ProcessReport {
    /// True when every document was written and the view was removed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.cleanup_error.is_none()
    }
}

/// Apply `f` to every document and write each result back.
///
/// A temporary view emitting every document is defined once, drained, and
/// deleted once after all rows are handled. Per-document failures and a
/// failed cleanup are collected in the returned report; failing to define or
/// query the view is returned as an error.
pub async fn process_documents<F>(db: &Database, mut f: F) -> StoreResult<ProcessReport>
where
    F: FnMut(&mut Document),
{
    let view = format!("{}/{}", PROCESS_DESIGN, PROCESS_VIEW);
    put_view(db, PROCESS_DESIGN, PROCESS_VIEW, PROCESS_MAP).await?;

    let rows = match list(db, &view).await {
        Ok(rows) => rows,
        Err(e) => {
            if let Err(cleanup) = remove_entry(db, &format!("_design/{}", PROCESS_DESIGN)).await {
                warn!(database = db.name(), error = %cleanup, "failed to remove temporary view");
            }
            return Err(e);
        }
    };
    debug!(database = db.name(), rows = rows.len(), "processing documents");

    let mut report = ProcessReport::default();
    for row in rows {
        let id = row
            .id
            .clone()
            .or_else(|| row.value.get("_id").and_then(Value::as_str).map(String::from))
            .unwrap_or_default();
        if id.is_empty() {
            report.failures.push(ProcessFailure {
                id,
                error: StoreError::Deserialization("View row has no document id".to_string()),
            });
            continue;
        }

        let mut doc = match row.value {
            Value::Object(doc) => doc,
            other => {
                report.failures.push(ProcessFailure {
                    id,
                    error: StoreError::Deserialization(format!(
                        "View row value is not a document: {}",
                        other
                    )),
                });
                continue;
            }
        };

        f(&mut doc);
        match update_entry(db, &id, doc).await {
            Ok(_) => report.processed += 1,
            Err(error) => {
                warn!(database = db.name(), id = %id, error = %error, "failed to write back document");
                report.failures.push(ProcessFailure { id, error });
            }
        }
    }

    if let Err(e) = remove_entry(db, &format!("_design/{}", PROCESS_DESIGN)).await {
        warn!(database = db.name(), error = %e, "failed to remove temporary view");
        report.cleanup_error = Some(e);
    }

    info!(
        database = db.name(),
        processed = report.processed,
        failed = report.failures.len(),
        "processed documents"
    );
    Ok(report)
}

/// Find documents whose `attributes.tags` contain `tag`.
///
/// Defines the `tags/by_tag` view when it is missing or outdated, then
/// queries it by key.
pub async fn search(db: &Database, tag: &str) -> StoreResult<Vec<ViewRow>> {
    ensure_view(db, SEARCH_DESIGN, SEARCH_VIEW, SEARCH_MAP).await?;
    let view = format!("{}/{}", SEARCH_DESIGN, SEARCH_VIEW);
    list_with(db, &view, &ViewQuery::with_key(tag)).await
}
