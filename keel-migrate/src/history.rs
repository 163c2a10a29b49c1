//! Execution ledger.
//!
//! The ledger is the database-resident record of which scripts ran, with
//! which checksum, and how that went. A record is only trusted when its
//! status is [`RecordStatus::Completed`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationScript;

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "_keel_migrations";

/// Default advisory lock key shared by every migrator of a database.
pub const DEFAULT_LOCK_KEY: i64 = 7_236_001;

/// Outcome of a script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Marked just before the script's transaction began.
    Running,
    /// The script's transaction committed.
    Completed,
    /// The script failed, or its batch failed validation.
    Failed,
}

impl RecordStatus {
    /// The value stored in the ledger's `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(MigrationError::database(format!(
                "unknown ledger status '{}'",
                other
            ))),
        }
    }
}

/// A row of the execution ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Script filename.
    pub filename: String,
    /// Checksum of the script content that was executed.
    pub checksum: String,
    /// Current status.
    pub status: RecordStatus,
    /// When the record was last written.
    pub executed_at: DateTime<Utc>,
    /// Execution time in milliseconds.
    pub execution_time_ms: i64,
    /// Error text for failed records.
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// Create a record in the given status, timestamped now.
    pub fn new(filename: impl Into<String>, checksum: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            filename: filename.into(),
            checksum: checksum.into(),
            status,
            executed_at: Utc::now(),
            execution_time_ms: 0,
            error_message: None,
        }
    }

    /// Whether the record proves the script ran with this checksum.
    pub fn is_completed_with(&self, checksum: &str) -> bool {
        self.status == RecordStatus::Completed && self.checksum == checksum
    }
}

/// Transactional storage for the execution ledger, plus the migration lock.
///
/// One implementation owns one exclusive database session for the whole run.
#[async_trait::async_trait]
pub trait ExecutionLedger: Send {
    /// Try to take the session-level migration lock without blocking.
    ///
    /// Returns `false` when another session holds it.
    async fn try_lock(&mut self, key: i64) -> MigrateResult<bool>;

    /// Release the migration lock.
    async fn unlock(&mut self, key: i64) -> MigrateResult<()>;

    /// Create the ledger table if it does not exist.
    async fn ensure_ledger(&mut self) -> MigrateResult<()>;

    /// All ledger records, ordered by filename.
    async fn records(&mut self) -> MigrateResult<Vec<ExecutionRecord>>;

    /// Record that a script is about to run. Committed on its own.
    async fn mark_running(&mut self, script: &MigrationScript) -> MigrateResult<()>;

    /// Execute the whole script and mark it completed in one transaction.
    ///
    /// On error the transaction is rolled back and
    /// [`MigrationError::ScriptFailed`] is returned. Returns the execution
    /// time in milliseconds.
    async fn apply(&mut self, script: &MigrationScript) -> MigrateResult<i64>;

    /// Record a failure for a script.
    async fn mark_failed(&mut self, filename: &str, checksum: &str, error: &str)
    -> MigrateResult<()>;
}

/// SQL statements for a PostgreSQL ledger table.
#[derive(Debug, Clone)]
pub struct LedgerSql {
    table: String,
}

impl LedgerSql {
    /// Statements for the given ledger table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// The ledger table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// `CREATE TABLE IF NOT EXISTS` for the ledger.
    pub fn create_table(&self) -> String {
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (
    filename TEXT PRIMARY KEY,
    checksum TEXT NOT NULL,
    status TEXT NOT NULL,
    executed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    execution_time_ms INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
)"#,
            table = self.table
        )
    }

    /// Select every record in filename order.
    pub fn select_all(&self) -> String {
        format!(
            r#"SELECT filename, checksum, status, executed_at, execution_time_ms, error_message FROM "{}" ORDER BY filename"#,
            self.table
        )
    }

    /// Upsert a record. Parameters: filename, checksum, status,
    /// execution_time_ms, error_message.
    pub fn upsert(&self) -> String {
        format!(
            r#"INSERT INTO "{}" (filename, checksum, status, executed_at, execution_time_ms, error_message)
VALUES ($1, $2, $3, NOW(), $4, $5)
ON CONFLICT (filename) DO UPDATE SET
    checksum = EXCLUDED.checksum,
    status = EXCLUDED.status,
    executed_at = EXCLUDED.executed_at,
    execution_time_ms = EXCLUDED.execution_time_ms,
    error_message = EXCLUDED.error_message"#,
            self.table
        )
    }
}

/// Non-blocking session-level advisory lock (PostgreSQL).
pub const POSTGRES_TRY_LOCK_SQL: &str = "SELECT pg_try_advisory_lock($1)";
/// Release of the advisory lock (PostgreSQL).
pub const POSTGRES_UNLOCK_SQL: &str = "SELECT pg_advisory_unlock($1)";
