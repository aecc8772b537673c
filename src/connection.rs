//! Connection configuration and database provisioning.
//!
//! A [`Database`] handle is only handed out after the existence check has
//! completed, so every facade operation runs against a database that was
//! present (or just created) at that point.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::store::{DocumentStore, StoreConnection, StoreError, StoreResult};

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default server port
pub const DEFAULT_PORT: u16 = 5984;
/// Default database name
pub const DEFAULT_DATABASE: &str = "default";

/// Username/password for HTTP basic auth
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// HTTP client options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientOptions {
    /// Use https instead of http
    #[serde(default)]
    pub secure: bool,
    /// Request timeout; no timeout when unset
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Everything needed to reach one database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Cache fetched documents per database handle
    #[serde(default)]
    pub cache: bool,
    /// Database to provision
    #[serde(default = "default_database")]
    pub database: String,
    /// HTTP client options
    #[serde(default)]
    pub options: ClientOptions,
    /// Basic auth credentials
    #[serde(default)]
    pub auth: Option<Credentials>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache: false,
            database: default_database(),
            options: ClientOptions::default(),
            auth: None,
        }
    }
}

impl ConnectionConfig {
    /// Server URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.options.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set basic auth credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

/// Handle scoping operations to one database
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.store.name())
            .field("backend", &self.store.backend_type())
            .finish()
    }
}

impl Database {
    pub(crate) fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Name of the bound database
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// The underlying store (for operations the facade does not wrap)
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}

/// What provisioning did to a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The database was already there
    Existing,
    /// The database was missing and has been created
    Created,
    /// The database was missing and the create request failed
    CreateFailed,
}

impl ProvisionOutcome {
    /// Short label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionOutcome::Existing => "existing",
            ProvisionOutcome::Created => "created",
            ProvisionOutcome::CreateFailed => "create failed",
        }
    }
}

/// Check that `name` exists on `conn`, creating it when absent.
///
/// The existence-check error is returned as-is. A failed create is logged
/// and the handle is still returned.
pub async fn provision<C>(conn: &C, name: &str) -> StoreResult<Database>
where
    C: StoreConnection + ?Sized,
{
    let (db, _) = ensure_database(conn, name).await?;
    Ok(db)
}

/// Same as [`provision`], also reporting whether the database was created.
pub async fn ensure_database<C>(conn: &C, name: &str) -> StoreResult<(Database, ProvisionOutcome)>
where
    C: StoreConnection + ?Sized,
{
    let store = conn.database(name);

    let outcome = if store.exists().await? {
        debug!(database = name, "database exists");
        ProvisionOutcome::Existing
    } else {
        match store.create().await {
            Ok(()) => {
                info!(database = name, "created database");
                ProvisionOutcome::Created
            }
            Err(e) => {
                warn!(database = name, error = %e, "failed to create database");
                ProvisionOutcome::CreateFailed
            }
        }
    };

    Ok((Database::new(store), outcome))
}

/// Re-bind a handle for `name` on an existing connection.
///
/// # Errors
///
/// Returns `StoreError::DatabaseMissing` if the database does not exist.
pub async fn update<C>(conn: &C, name: &str) -> StoreResult<Database>
where
    C: StoreConnection + ?Sized,
{
    let store = conn.database(name);

    if !store.exists().await? {
        return Err(StoreError::DatabaseMissing(name.to_string()));
    }

    Ok(Database::new(store))
}

/// Connect to CouchDB with `config` and provision `config.database`.
///
/// # Example
///
/// ```rust,no_run
/// use couchkit::connection::{setup, ConnectionConfig};
///
/// async fn example() -> couchkit::store::StoreResult<()> {
///     let config = ConnectionConfig::default().with_database("users");
///     let (conn, db) = setup(config).await?;
///     println!("{} on {}", db.name(), conn.base_url());
///     Ok(())
/// }
/// ```
#[cfg(feature = "couchdb")]
pub async fn setup(
    config: ConnectionConfig,
) -> StoreResult<(crate::store::CouchConnection, Database)> {
    let database = config.database.clone();
    let conn = crate::store::CouchConnection::new(config)?;
    let db = provision(&conn, &database).await?;
    Ok((conn, db))
}
