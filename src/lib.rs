//! couchkit - convenience helpers over a CouchDB database
//!
//! couchkit configures a connection, makes sure a database exists and wraps
//! the everyday document operations in small async functions:
//!
//! - **`connection`** - Explicit connection configuration, provisioning and handle re-binding
//! - **`facade`** - Entry helpers (get/add/merge/update/remove), view listing, bulk processing, tag search
//! - **`encoding`** - Recursive escape/unescape of document string values
//! - **`store`** - The `DocumentStore` seam with CouchDB and in-memory backends
//! - **`config`** - TOML and environment configuration loading
//! - **`observability`** - Markdown operation journal
//!
//! # Features
//!
//! ```toml
//! [dependencies]
//! couchkit = { version = "0.1" }
//! # Only the facade and the in-memory store:
//! couchkit = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use couchkit::prelude::*;
//!
//! async fn example() -> StoreResult<()> {
//!     let config = ConnectionConfig::default().with_database("users");
//!     let (_conn, db) = setup(config).await?;
//!
//!     let doc = get_entry(&db, "ada", GetOptions { escape: true }).await?;
//!     println!("{:?}", doc.get("name"));
//!
//!     let report = process_documents(&db, |doc| {
//!         doc.insert("migrated".into(), true.into());
//!     })
//!     .await?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Connection configuration and provisioning
pub mod connection;

/// Escape/unescape helpers for document values
pub mod encoding;

/// Facade operations over a database handle
pub mod facade;

/// Document store traits and backends
pub mod store;

/// Configuration management (enabled with the `config` feature)
#[cfg(feature = "config")]
pub mod config;

/// Observability utilities (enabled with the `observability` feature)
#[cfg(feature = "observability")]
pub mod observability;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::connection::{
        ensure_database, provision, update, ClientOptions, ConnectionConfig, Credentials,
        Database, ProvisionOutcome,
    };

    #[cfg(feature = "couchdb")]
    pub use crate::connection::setup;

    pub use crate::encoding::{escape_document, unescape_document};

    pub use crate::facade::{
        add_entry, get_entry, list, list_all, merge_entry, process_documents, remove_entry,
        search, update_entry, GetOptions, ProcessReport,
    };

    pub use crate::store::{
        Document, DocumentStore, MemoryConnection, StoreConnection, StoreError, StoreResult,
        ViewQuery, ViewRow,
    };

    #[cfg(feature = "couchdb")]
    pub use crate::store::CouchConnection;

    #[cfg(feature = "config")]
    pub use crate::config::{ConfigurationLoader, EnvironmentLoader};

    #[cfg(feature = "observability")]
    pub use crate::observability::Logger;
}
