//! Configuration management for database connections.
//!
//! This module provides configuration loading through TOML files and
//! environment variable overrides via `.env` files.
//!
//! # Example
//!
//! ```no_run
//! use couchkit::config::{ConfigurationLoader, EnvironmentLoader};
//! use std::path::Path;
//!
//! // Load configuration from TOML
//! let loader = ConfigurationLoader::new(Some(Path::new("config/couchkit.toml"))).unwrap();
//! let mut connection = loader.config.couchdb.clone();
//!
//! // Apply COUCHDB_* overrides
//! EnvironmentLoader::new(None).apply_to(&mut connection);
//!
//! println!("Connecting to {}", connection.base_url());
//! ```

pub mod config;
pub mod environment;

// Re-export main types for convenience
pub use self::config::{Configuration, ConfigurationLoader, LoggingConfig};
pub use self::environment::EnvironmentLoader;
