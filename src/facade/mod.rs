//! Convenience helpers over a [`Database`](crate::connection::Database) handle.
//!
//! Every function takes the handle explicitly and resolves exactly once;
//! nothing is retried and no state is kept between calls.
//!
//! # Example
//!
//! ```rust,no_run
//! use couchkit::connection::provision;
//! use couchkit::facade::{get_entry, update_entry, GetOptions};
//! use couchkit::store::{Document, MemoryConnection};
//!
//! async fn example() -> couchkit::store::StoreResult<()> {
//!     let conn = MemoryConnection::new();
//!     let db = provision(&conn, "users").await?;
//!
//!     let mut entry = Document::new();
//!     entry.insert("name".into(), "ada".into());
//!     update_entry(&db, "ada", entry).await?;
//!
//!     let doc = get_entry(&db, "ada", GetOptions::default()).await?;
//!     assert_eq!(doc["name"], "ada");
//!     Ok(())
//! }
//! ```

mod entry;
mod query;

pub use entry::{add_entry, get_entry, merge_entry, remove_entry, update_entry, GetOptions};
pub use query::{
    ensure_view, list, list_all, list_with, process_documents, put_view, search, ProcessFailure,
    ProcessReport, LIST_ALL_VIEW, PROCESS_DESIGN, PROCESS_VIEW, SEARCH_DESIGN, SEARCH_VIEW,
};
