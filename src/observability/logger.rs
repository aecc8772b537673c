//! Markdown journal of database operations.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::connection::{ConnectionConfig, ProvisionOutcome};
use crate::facade::ProcessReport;

/// Logger for database sessions.
///
/// This logger creates markdown-formatted log files recording connection
/// setup, provisioning, bulk processing results and errors.
#[derive(Debug)]
pub struct Logger {
    log_file: PathBuf,
    log_level: String,
}

impl Logger {
    /// Initialize logger.
    ///
    /// # Arguments
    /// * `log_file` - Path to log file. If None, creates a timestamped file in temp directory.
    /// * `log_level` - Logging level (defaults to "INFO").
    pub fn new(log_file: Option<&Path>, log_level: Option<&str>) -> Result<Self> {
        let log_file = match log_file {
            Some(p) => p.to_path_buf(),
            None => {
                let mut dir = std::env::temp_dir();
                dir.push("couchkit-logs");
                let filename = format!(
                    "couchkit_{}_{}.md",
                    Utc::now().timestamp_millis(),
                    std::process::id()
                );
                dir.join(filename)
            }
        };

        let log_level = log_level.unwrap_or("INFO").to_uppercase();

        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }

        let logger = Self {
            log_file,
            log_level,
        };

        if !logger.log_file.exists() {
            logger.initialize_log_file()?;
        }

        Ok(logger)
    }

    /// Build a logger from the `[logging]` table of the configuration file.
    #[cfg(feature = "config")]
    pub fn from_config(config: &crate::config::LoggingConfig) -> Result<Self> {
        Self::new(
            config.log_file.as_deref().map(Path::new),
            Some(config.log_level.as_str()),
        )
    }

    fn initialize_log_file(&self) -> Result<()> {
        let mut file = File::create(&self.log_file)
            .with_context(|| format!("Failed to create log file: {}", self.log_file.display()))?;

        let now: DateTime<Utc> = Utc::now();

        writeln!(file, "# Database Operation Log\n")?;
        writeln!(file, "Log started: {}\n", now.to_rfc3339())?;
        writeln!(file, "---\n")?;

        Ok(())
    }

    fn append_to_log(&self, content: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .with_context(|| format!("Failed to open log file: {}", self.log_file.display()))?;

        write!(file, "{}", content).with_context(|| "Failed to write to log file")?;

        Ok(())
    }

    fn is_debug(&self) -> bool {
        self.log_level == "DEBUG"
    }

    /// Log session start with the connection in use. Credentials are never written.
    pub fn log_session_start(&self, config: &ConnectionConfig) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let mut content = format!(
            "## Session Started - {}\n\n**Server:** {}\n**Database:** {}\n**Cache:** {}\n",
            now.to_rfc3339(),
            config.base_url(),
            config.database,
            config.cache
        );
        if let Some(auth) = &config.auth {
            content.push_str(&format!("**User:** {}\n", auth.username));
        }
        content.push('\n');

        self.append_to_log(&content)?;
        tracing::info!(server = %config.base_url(), database = %config.database, "session started");
        Ok(())
    }

    /// Log the outcome of provisioning a database.
    pub fn log_provision(&self, database: &str, outcome: ProvisionOutcome) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let content = format!(
            "### Provision - {}\n\n**Database:** {}\n**Action:** {}\n\n",
            now.to_rfc3339(),
            database,
            outcome.as_str()
        );

        self.append_to_log(&content)
    }

    /// Log a bulk processing report.
    ///
    /// Failed documents are always listed; in DEBUG the full error of each
    /// one is written too.
    pub fn log_process_report(&self, database: &str, report: &ProcessReport) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let mut content = format!(
            "### Bulk Processing - {}\n\n**Database:** {}\n**Processed:** {}\n**Failed:** {}\n",
            now.to_rfc3339(),
            database,
            report.processed,
            report.failures.len()
        );

        if !report.failures.is_empty() {
            content.push_str("\n**Failures:**\n");
            for failure in &report.failures {
                if self.is_debug() {
                    content.push_str(&format!("- `{}`: {}\n", failure.id, failure.error));
                } else {
                    content.push_str(&format!("- `{}`\n", failure.id));
                }
            }
        }

        if let Some(e) = &report.cleanup_error {
            content.push_str(&format!("\n**Cleanup failed:** {}\n", e));
        }
        content.push('\n');

        self.append_to_log(&content)
    }

    /// Log an error with the operation it came from.
    pub fn log_error(&self, operation: &str, error: &dyn std::fmt::Display) -> Result<()> {
        let now: DateTime<Utc> = Utc::now();
        let content = format!(
            "### Error - {}\n\n**Operation:** {}\n**Error:** {}\n\n",
            now.to_rfc3339(),
            operation,
            error
        );

        self.append_to_log(&content)?;
        tracing::error!(operation, error = %error, "operation failed");
        Ok(())
    }

    /// Log a custom entry. DEBUG entries are dropped unless the logger is at DEBUG.
    pub fn log_custom(&self, title: &str, content: &str, level: Option<&str>) -> Result<()> {
        let level = level.unwrap_or("INFO").to_uppercase();
        if level == "DEBUG" && !self.is_debug() {
            return Ok(());
        }

        let now: DateTime<Utc> = Utc::now();
        let entry = format!(
            "### {} - {}\n\n**Level:** {}\n\n{}\n\n",
            title,
            now.to_rfc3339(),
            level,
            content
        );

        self.append_to_log(&entry)
    }

    /// Get the log file path.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Get the log level.
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}
