//! PostgreSQL implementation of the migration database traits.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_migrate::history::{POSTGRES_TRY_LOCK_SQL, POSTGRES_UNLOCK_SQL};
use keel_migrate::seed::{SeedRow, exists_sql, insert_sql};
use keel_migrate::validate::postgres_queries;
use keel_migrate::{
    ExecutionLedger, ExecutionRecord, LedgerSql, MigrateResult, MigrationError, MigrationScript,
    RecordStatus, RetryPolicy, SchemaCatalog, SchemaSnapshot, SeedTarget,
};
use tracing::{debug, info};

use crate::config::PgConfig;
use crate::connection::PgConnection;
use crate::error::PgError;

const LEDGER_EXISTS_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_schema = current_schema() AND table_name = $1::text
    )
"#;

const TABLE_EXISTS_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_schema = $1::text AND table_name = $2::text AND table_type = 'BASE TABLE'
    )
"#;

/// A migration session against one PostgreSQL database.
pub struct PgMigrationDatabase {
    conn: PgConnection,
    ledger: LedgerSql,
}

impl PgMigrationDatabase {
    /// Open a dedicated session.
    pub async fn connect(config: &PgConfig) -> MigrateResult<Self> {
        let conn = PgConnection::connect(config).await?;
        info!(database = %config.database, host = %config.host, "Connected");
        Ok(Self::from_connection(conn, &config.ledger_table))
    }

    /// Open a dedicated session, retrying transient connection failures.
    pub async fn connect_with_retry(config: &PgConfig, retry: &RetryPolicy) -> MigrateResult<Self> {
        retry
            .run("connect to PostgreSQL", || Self::connect(config))
            .await
    }

    /// Wrap an already open session.
    pub fn from_connection(conn: PgConnection, ledger_table: &str) -> Self {
        Self {
            conn,
            ledger: LedgerSql::new(ledger_table),
        }
    }

    /// The underlying session.
    pub fn connection(&self) -> &PgConnection {
        &self.conn
    }

    /// The ledger table name.
    pub fn ledger_table(&self) -> &str {
        self.ledger.table()
    }

    async fn ledger_exists(&self) -> MigrateResult<bool> {
        let row = self
            .conn
            .query_one(LEDGER_EXISTS_SQL, &[&self.ledger.table()])
            .await?;
        Ok(row.get(0))
    }

    async fn write_record(
        &self,
        filename: &str,
        checksum: &str,
        status: RecordStatus,
        error: Option<&str>,
    ) -> MigrateResult<()> {
        self.conn
            .execute(
                &self.ledger.upsert(),
                &[&filename, &checksum, &status.as_str(), &0i32, &error],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionLedger for PgMigrationDatabase {
    async fn try_lock(&mut self, key: i64) -> MigrateResult<bool> {
        let row = self.conn.query_one(POSTGRES_TRY_LOCK_SQL, &[&key]).await?;
        Ok(row.get(0))
    }

    async fn unlock(&mut self, key: i64) -> MigrateResult<()> {
        let row = self.conn.query_one(POSTGRES_UNLOCK_SQL, &[&key]).await?;
        let released: bool = row.get(0);
        if !released {
            debug!(key, "Advisory lock was not held by this session");
        }
        Ok(())
    }

    async fn ensure_ledger(&mut self) -> MigrateResult<()> {
        self.conn.batch_execute(&self.ledger.create_table()).await?;
        Ok(())
    }

    async fn records(&mut self) -> MigrateResult<Vec<ExecutionRecord>> {
        if !self.ledger_exists().await? {
            return Ok(Vec::new());
        }

        let rows = self.conn.query(&self.ledger.select_all(), &[]).await?;
        rows.iter()
            .map(|row| -> MigrateResult<ExecutionRecord> {
                let status: String = row.get("status");
                let executed_at: DateTime<Utc> = row.get("executed_at");
                let execution_time_ms: i32 = row.get("execution_time_ms");
                Ok(ExecutionRecord {
                    filename: row.get("filename"),
                    checksum: row.get("checksum"),
                    status: status.parse::<RecordStatus>()?,
                    executed_at,
                    execution_time_ms: i64::from(execution_time_ms),
                    error_message: row.get("error_message"),
                })
            })
            .collect()
    }

    async fn mark_running(&mut self, script: &MigrationScript) -> MigrateResult<()> {
        self.write_record(
            &script.filename,
            &script.checksum,
            RecordStatus::Running,
            None,
        )
        .await
    }

    async fn apply(&mut self, script: &MigrationScript) -> MigrateResult<i64> {
        let upsert = self.ledger.upsert();
        let started = Instant::now();

        let txn = self.conn.transaction().await?;
        if let Err(e) = txn.batch_execute(&script.content).await {
            if let Err(rollback) = txn.rollback().await {
                debug!(script = %script.filename, "Rollback after failed script: {}", rollback);
            }
            return Err(script_error(&script.filename, e));
        }

        let elapsed = started.elapsed().as_millis() as i64;
        let elapsed_i32 = i32::try_from(elapsed).unwrap_or(i32::MAX);
        let no_error: Option<&str> = None;
        txn.execute(
            &upsert,
            &[
                &script.filename,
                &script.checksum,
                &RecordStatus::Completed.as_str(),
                &elapsed_i32,
                &no_error,
            ],
        )
        .await?;
        txn.commit()
            .await
            .map_err(|e| script_error(&script.filename, e))?;

        Ok(elapsed)
    }

    async fn mark_failed(
        &mut self,
        filename: &str,
        checksum: &str,
        error: &str,
    ) -> MigrateResult<()> {
        self.write_record(filename, checksum, RecordStatus::Failed, Some(error))
            .await
    }
}

#[async_trait]
impl SchemaCatalog for PgMigrationDatabase {
    async fn snapshot(&mut self, schema: &str) -> MigrateResult<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::new();
        let ledger = self.ledger.table().to_lowercase();

        for row in self.conn.query(postgres_queries::TABLES, &[&schema]).await? {
            let table: String = row.get(0);
            if table.to_lowercase() != ledger {
                snapshot.add_table(&table);
            }
        }
        for row in self.conn.query(postgres_queries::COLUMNS, &[&schema]).await? {
            let table: String = row.get(0);
            let column: String = row.get(1);
            if table.to_lowercase() != ledger {
                snapshot.add_column(&table, &column);
            }
        }

        debug!(schema, tables = snapshot.len(), "Captured schema snapshot");
        Ok(snapshot)
    }
}

#[async_trait]
impl SeedTarget for PgMigrationDatabase {
    async fn table_exists(&mut self, schema: &str, table: &str) -> MigrateResult<bool> {
        let row = self
            .conn
            .query_one(TABLE_EXISTS_SQL, &[&schema, &table])
            .await?;
        Ok(row.get(0))
    }

    async fn row_exists(
        &mut self,
        schema: &str,
        table: &str,
        key: &[(&str, &serde_json::Value)],
    ) -> MigrateResult<bool> {
        let row = self
            .conn
            .query_opt(&exists_sql(schema, table, key), &[])
            .await?;
        Ok(row.is_some())
    }

    async fn insert_row(&mut self, schema: &str, table: &str, row: &SeedRow) -> MigrateResult<u64> {
        let count = self
            .conn
            .execute(&insert_sql(schema, table, row), &[])
            .await?;
        Ok(count)
    }
}

fn script_error(filename: &str, err: PgError) -> MigrationError {
    if err.is_connection_error() {
        return err.into();
    }
    MigrationError::script_failed(filename, err.detail())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_keeps_connection_failures() {
        let err = script_error("0001_init.sql", PgError::connection("reset by peer"));
        assert!(err.is_transient());

        let err = script_error("0001_init.sql", PgError::query("syntax error at or near"));
        assert!(matches!(
            err,
            MigrationError::ScriptFailed { ref filename, .. } if filename == "0001_init.sql"
        ));
    }
}
