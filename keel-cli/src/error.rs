//! CLI error types and result alias.

use keel_migrate::{FailureKind, MigrationError};
use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(keel::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(keel::config),
        help("check keel.toml and the DATABASE_URL environment variable")
    )]
    Config(String),

    /// Scripts or manifest could not be prepared
    #[error("Preflight failed: {0}")]
    #[diagnostic(code(keel::preflight))]
    Preflight(String),

    /// Another migrator holds the lock
    #[error("{0}")]
    #[diagnostic(
        code(keel::lock),
        help("another deployment is migrating; retry later or pass --wait")
    )]
    Lock(String),

    /// Migration error
    #[error("Migration error: {0}")]
    #[diagnostic(code(keel::migration))]
    Migration(String),

    /// Validation error
    #[error("Validation error: {0}")]
    #[diagnostic(code(keel::validation))]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    #[diagnostic(code(keel::database))]
    Database(String),

    /// Seed error
    #[error("Seed error: {0}")]
    #[diagnostic(code(keel::seed))]
    Seed(String),

    /// Command error
    #[error("Command error: {0}")]
    #[diagnostic(code(keel::command))]
    Command(String),
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        let message = err.to_string();
        match err.kind() {
            FailureKind::Preflight => CliError::Preflight(message),
            FailureKind::LockContention => CliError::Lock(message),
            FailureKind::Graph | FailureKind::Execution => CliError::Migration(message),
            FailureKind::PostCondition => CliError::Validation(message),
            FailureKind::Database => CliError::Database(message),
            FailureKind::Seed => CliError::Seed(message),
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        CliError::Config(format!("Failed to serialize TOML: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Command(format!("Failed to serialize JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_error_mapping() {
        let err: CliError = MigrationError::LockContention(7).into();
        assert!(matches!(err, CliError::Lock(_)));

        let err: CliError = MigrationError::CircularDependency(vec!["a.sql".into()]).into();
        assert!(matches!(err, CliError::Migration(_)));

        let err: CliError = MigrationError::SchemaInvalid("missing tables: users".into()).into();
        assert!(matches!(err, CliError::Validation(_)));
    }
}
