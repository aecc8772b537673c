//! Observability utilities.
//!
//! Diagnostics are emitted as `tracing` events throughout the crate; this
//! module adds a markdown journal for keeping a readable record of a session.
//!
//! # Example
//!
//! ```no_run
//! use couchkit::connection::{ConnectionConfig, ProvisionOutcome};
//! use couchkit::observability::Logger;
//!
//! let logger = Logger::new(None, Some("DEBUG")).unwrap();
//! logger.log_session_start(&ConnectionConfig::default()).unwrap();
//! logger.log_provision("default", ProvisionOutcome::Existing).unwrap();
//! ```

pub mod logger;

// Re-export main types for convenience
pub use logger::Logger;
