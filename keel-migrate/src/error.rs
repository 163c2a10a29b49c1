//! Error types for the migration engine.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The migrations directory does not exist.
    #[error("Migrations directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A script matched by the loader could not be read.
    #[error("Cannot read migration script {}: {message}", .path.display())]
    UnreadableScript {
        /// Path of the script.
        path: PathBuf,
        /// Underlying reason.
        message: String,
    },

    /// A script is empty after trimming whitespace.
    #[error("Migration script '{0}' is empty")]
    EmptyScript(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The expected-schema manifest could not be loaded.
    #[error("Schema manifest error: {0}")]
    Manifest(String),

    /// Connection-level failure (eligible for retry).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Another process holds the migration lock.
    #[error("Another migrator is running (advisory lock {0} is held by another session)")]
    LockContention(i64),

    /// Waiting for the migration lock timed out.
    #[error("Timed out after {waited_ms}ms waiting for advisory lock {key}")]
    LockTimeout {
        /// Lock key.
        key: i64,
        /// How long the run waited.
        waited_ms: u64,
    },

    /// The dependency graph contains a cycle.
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    /// A script failed while executing; it was rolled back.
    #[error("Migration '{filename}' failed: {message}")]
    ScriptFailed {
        /// Script filename.
        filename: String,
        /// Database error text.
        message: String,
    },

    /// The schema does not match the manifest after all scripts ran.
    #[error("Schema validation failed after migration: {0}")]
    SchemaInvalid(String),

    /// Seeding failed.
    #[error("Seed error: {0}")]
    Seed(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

/// Coarse classification of a failed run, reported to deployment tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Failed before touching the database.
    Preflight,
    /// Another migrator holds the lock.
    LockContention,
    /// The dependency graph could not be ordered.
    Graph,
    /// A script failed and the run halted.
    Execution,
    /// The schema did not match the manifest after the run.
    PostCondition,
    /// Connection or ledger I/O failed.
    Database,
    /// Baseline data could not be seeded.
    Seed,
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create a script failure.
    pub fn script_failed(filename: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ScriptFailed {
            filename: filename.into(),
            message: msg.into(),
        }
    }

    /// Create a seed error.
    pub fn seed(msg: impl Into<String>) -> Self {
        Self::Seed(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if this error is transient and the operation may be retried.
    ///
    /// Only connection-level failures qualify; a failed script never does.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Classify this error for the run report.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Io(_)
            | Self::DirectoryNotFound(_)
            | Self::UnreadableScript { .. }
            | Self::EmptyScript(_)
            | Self::Config(_)
            | Self::Manifest(_) => FailureKind::Preflight,
            Self::LockContention(_) | Self::LockTimeout { .. } => FailureKind::LockContention,
            Self::CircularDependency(_) => FailureKind::Graph,
            Self::ScriptFailed { .. } => FailureKind::Execution,
            Self::SchemaInvalid(_) => FailureKind::PostCondition,
            Self::Seed(_) => FailureKind::Seed,
            Self::Connection(_) | Self::Database(_) | Self::Other(_) => FailureKind::Database,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::EmptyScript("0001_init.sql".to_string());
        assert!(err.to_string().contains("0001_init.sql"));
    }

    #[test]
    fn test_cycle_display() {
        let err = MigrationError::CircularDependency(vec![
            "0001_a.sql".to_string(),
            "0002_b.sql".to_string(),
            "0001_a.sql".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: 0001_a.sql -> 0002_b.sql -> 0001_a.sql"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(MigrationError::connection("reset by peer").is_transient());
        assert!(!MigrationError::script_failed("0001.sql", "syntax error").is_transient());
        assert!(!MigrationError::LockContention(1).is_transient());
    }

    #[test]
    fn test_kind() {
        assert_eq!(
            MigrationError::DirectoryNotFound(PathBuf::from("x")).kind(),
            FailureKind::Preflight
        );
        assert_eq!(
            MigrationError::LockContention(7).kind(),
            FailureKind::LockContention
        );
        assert_eq!(
            MigrationError::SchemaInvalid("missing users".into()).kind(),
            FailureKind::PostCondition
        );
    }
}
