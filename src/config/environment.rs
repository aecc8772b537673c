//! Environment variable loading and management.
//!
//! Connection settings can be overridden with `COUCHDB_*` variables, read
//! from the process environment and optionally from a `.env` file.

use std::env;
use std::path::Path;

use crate::connection::{ConnectionConfig, Credentials};

/// Loads environment variables from .env file and system environment.
#[derive(Debug, Clone)]
pub struct EnvironmentLoader {
    env_file: Option<String>,
}

impl EnvironmentLoader {
    /// Initialize the environment loader.
    ///
    /// # Arguments
    /// * `env_file` - Path to .env file. Nothing is loaded from disk when None.
    pub fn new(env_file: Option<&Path>) -> Self {
        // Only load a .env file if an explicit path was provided, so tests
        // never pick up a repository .env by accident.
        if let Some(path) = env_file {
            if path.exists() {
                if let Err(e) = dotenv::from_path(path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load .env file");
                }
            }
        }

        Self {
            env_file: env_file.map(|p| p.to_string_lossy().to_string()),
        }
    }

    /// Path of the .env file given at construction
    pub fn env_file(&self) -> Option<&str> {
        self.env_file.as_deref()
    }

    /// `COUCHDB_HOST`
    pub fn host(&self) -> Option<String> {
        env::var("COUCHDB_HOST").ok()
    }

    /// `COUCHDB_PORT`, ignored when not a valid port number
    pub fn port(&self) -> Option<u16> {
        env::var("COUCHDB_PORT").ok().and_then(|p| p.parse().ok())
    }

    /// `COUCHDB_DATABASE`
    pub fn database(&self) -> Option<String> {
        env::var("COUCHDB_DATABASE").ok()
    }

    /// `COUCHDB_USER` and `COUCHDB_PASSWORD`; both must be set
    pub fn credentials(&self) -> Option<Credentials> {
        let username = env::var("COUCHDB_USER").ok()?;
        let password = env::var("COUCHDB_PASSWORD").ok()?;
        Some(Credentials { username, password })
    }

    /// Overlay every variable that is set onto `config`.
    pub fn apply_to(&self, config: &mut ConnectionConfig) {
        if let Some(host) = self.host() {
            config.host = host;
        }
        if let Some(port) = self.port() {
            config.port = port;
        }
        if let Some(database) = self.database() {
            config.database = database;
        }
        if let Some(credentials) = self.credentials() {
            config.auth = Some(credentials);
        }
    }
}

impl Default for EnvironmentLoader {
    fn default() -> Self {
        Self::new(None)
    }
}
