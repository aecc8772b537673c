//! Document Store Abstraction
//!
//! This module provides a trait-based abstraction over the document database
//! the facade talks to. The CouchDB backend speaks the server's HTTP API; the
//! in-memory backend follows the same write rules without a server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   facade functions  │
//! │   (&Database)       │
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   DocumentStore     │  <-- Trait
//! │      (async)        │
//! └──────────┬──────────┘
//!            │
//!     ┌──────┴──────┐
//!     │             │
//! ┌───▼────┐   ┌────▼───┐
//! │ CouchDB│   │ Memory │
//! │Backend │   │Backend │
//! └────────┘   └────────┘
//! ```

mod memory;
mod traits;

pub use memory::*;
pub use traits::*;

#[cfg(feature = "couchdb")]
mod couchdb;

#[cfg(feature = "couchdb")]
pub use couchdb::{CouchConnection, CouchDatabase};
