//! Single-document helpers.

use serde_json::Value;
use tracing::debug;

use crate::connection::Database;
use crate::encoding::unescape_document;
use crate::store::{Document, StoreResult};

/// Options for [`get_entry`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Unescape the document's string values before returning it
    pub escape: bool,
}

impl GetOptions {
    /// Options requesting an unescaped document.
    pub fn escaped() -> Self {
        Self { escape: true }
    }
}

fn revision_of(doc: &Document) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}

/// Save `data` as a new document and hand the database back.
pub async fn add_entry(db: &Database, data: Document) -> StoreResult<Database> {
    let saved = db.store().save(data).await?;
    debug!(database = db.name(), id = %saved.id, rev = %saved.rev, "added entry");
    Ok(db.clone())
}

/// Fetch document `id`.
///
/// With `options.escape` set, string values are unescaped before returning.
pub async fn get_entry(db: &Database, id: &str, options: GetOptions) -> StoreResult<Document> {
    let mut doc = db.store().get(id).await?;
    if options.escape {
        unescape_document(&mut doc);
    }
    Ok(doc)
}

/// Overlay the fields of `entry` onto document `id`.
pub async fn merge_entry(db: &Database, id: &str, entry: Document) -> StoreResult<bool> {
    db.store().merge(id, entry).await?;
    Ok(true)
}

/// Replace document `id` with `entry`, creating it if it does not exist.
///
/// The current revision is fetched right before the write. When the document
/// is missing it is saved under `id` without a revision.
pub async fn update_entry(db: &Database, id: &str, mut entry: Document) -> StoreResult<bool> {
    let store = db.store();

    match store.get_current(id).await {
        Ok(current) => {
            let rev = revision_of(&current).unwrap_or_default().to_string();
            store.save_revision(id, &rev, entry).await?;
            debug!(database = db.name(), id, rev = %rev, "updated entry");
        }
        Err(e) if e.is_not_found() => {
            entry.remove("_rev");
            entry.insert("_id".to_string(), Value::String(id.to_string()));
            store.save(entry).await?;
            debug!(database = db.name(), id, "created entry");
        }
        Err(e) => return Err(e),
    }

    Ok(true)
}

/// Delete document `id` at its current revision.
///
/// The revision is read from the server right before the delete. A failed
/// fetch is returned and nothing is removed.
pub async fn remove_entry(db: &Database, id: &str) -> StoreResult<bool> {
    let current = db.store().get_current(id).await?;
    let rev = revision_of(&current).unwrap_or_default();
    db.store().remove(id, rev).await?;
    debug!(database = db.name(), id, "removed entry");
    Ok(true)
}
