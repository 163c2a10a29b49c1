//! In-memory database backend.
//!
//! Simulates enough of PostgreSQL for the engine to be exercised without a
//! server: tables and columns, the ledger, session-level advisory locks and
//! seed rows. Each script runs against a copy of the schema that replaces
//! the live one only when every statement succeeds, so a failing script
//! leaves no trace, the same as a rolled-back transaction.
//!
//! ```rust,no_run
//! # async fn example() {
//! use keel_migrate::{MemoryDatabase, MigrationConfig, MigrationEngine};
//!
//! let db = MemoryDatabase::new();
//! let mut session = db.connect();
//! let report = MigrationEngine::new(MigrationConfig::new())
//!     .run(&mut session)
//!     .await;
//! assert!(report.success);
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::debug;

use crate::analyze::{self, SchemaObject};
use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationScript;
use crate::history::{DEFAULT_LEDGER_TABLE, ExecutionLedger, ExecutionRecord, RecordStatus};
use crate::manifest::DEFAULT_SCHEMA;
use crate::seed::{SeedRow, SeedTarget};
use crate::validate::{SchemaCatalog, SchemaSnapshot};

type Tables = BTreeMap<String, IndexSet<String>>;

#[derive(Debug, Default)]
struct ServerState {
    tables: Tables,
    ledger: Option<BTreeMap<String, ExecutionRecord>>,
    locks: HashMap<i64, u64>,
    rows: BTreeMap<String, Vec<SeedRow>>,
    injected_failures: BTreeMap<String, String>,
    next_session: u64,
}

/// A shared in-memory database. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<ServerState>>,
    schema: String,
    ledger_table: String,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Create an empty database with a `public` schema.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            schema: DEFAULT_SCHEMA.to_string(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    /// Use a different schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Open a new session.
    pub fn connect(&self) -> MemorySession {
        let id = {
            let mut state = self.state.lock();
            state.next_session += 1;
            state.next_session
        };
        MemorySession {
            db: self.clone(),
            id,
        }
    }

    /// Make a script fail with `message` whenever it is applied.
    pub fn fail_script(&self, filename: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .injected_failures
            .insert(filename.into(), message.into());
    }

    /// Stop failing a script.
    pub fn clear_failure(&self, filename: &str) {
        self.state.lock().injected_failures.remove(filename);
    }

    /// Create a table directly, outside any migration.
    pub fn create_table<I, S>(&self, table: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns = columns.into_iter().map(|c| c.as_ref().to_lowercase()).collect();
        self.state.lock().tables.insert(table.to_lowercase(), columns);
    }

    /// Drop a table directly, simulating out-of-band drift.
    pub fn drop_table(&self, table: &str) -> bool {
        let mut state = self.state.lock();
        state.rows.remove(table);
        state.tables.remove(&table.to_lowercase()).is_some()
    }

    /// Drop a column directly.
    pub fn drop_column(&self, table: &str, column: &str) -> bool {
        self.state
            .lock()
            .tables
            .get_mut(&table.to_lowercase())
            .is_some_and(|columns| columns.shift_remove(&column.to_lowercase()))
    }

    /// Write a ledger record directly.
    pub fn put_record(&self, record: ExecutionRecord) {
        self.state
            .lock()
            .ledger
            .get_or_insert_default()
            .insert(record.filename.clone(), record);
    }

    /// Current ledger contents.
    pub fn ledger(&self) -> Vec<ExecutionRecord> {
        self.state
            .lock()
            .ledger
            .as_ref()
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up one ledger record.
    pub fn record(&self, filename: &str) -> Option<ExecutionRecord> {
        self.state
            .lock()
            .ledger
            .as_ref()
            .and_then(|l| l.get(filename).cloned())
    }

    /// Check whether a table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(&table.to_lowercase())
    }

    /// Columns of a table, in creation order.
    pub fn columns(&self, table: &str) -> Vec<String> {
        self.state
            .lock()
            .tables
            .get(&table.to_lowercase())
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Seed rows stored for a table.
    pub fn rows(&self, table: &str) -> Vec<SeedRow> {
        self.state.lock().rows.get(table).cloned().unwrap_or_default()
    }

    /// The holder session of an advisory lock.
    pub fn lock_holder(&self, key: i64) -> Option<u64> {
        self.state.lock().locks.get(&key).copied()
    }

    /// The ledger table name, which never appears in snapshots.
    pub fn ledger_table(&self) -> &str {
        &self.ledger_table
    }
}

/// One session on a [`MemoryDatabase`]. Dropping it releases its locks.
#[derive(Debug)]
pub struct MemorySession {
    db: MemoryDatabase,
    id: u64,
}

impl MemorySession {
    /// Session identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The database this session is connected to.
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    fn require_schema(&self, schema: &str, table: &str) -> MigrateResult<()> {
        if schema.eq_ignore_ascii_case(&self.db.schema) {
            return Ok(());
        }
        Err(MigrationError::database(format!(
            "relation \"{}.{}\" does not exist",
            schema, table
        )))
    }

    fn upsert(&self, record: ExecutionRecord) -> MigrateResult<()> {
        let mut state = self.db.state.lock();
        let ledger = state.ledger.as_mut().ok_or_else(|| {
            MigrationError::database(format!(
                "relation \"{}\" does not exist",
                self.db.ledger_table
            ))
        })?;
        ledger.insert(record.filename.clone(), record);
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let id = self.id;
        self.db.state.lock().locks.retain(|_, holder| *holder != id);
    }
}

#[async_trait::async_trait]
impl ExecutionLedger for MemorySession {
    async fn try_lock(&mut self, key: i64) -> MigrateResult<bool> {
        let mut state = self.db.state.lock();
        match state.locks.get(&key) {
            Some(holder) if *holder != self.id => Ok(false),
            _ => {
                state.locks.insert(key, self.id);
                Ok(true)
            }
        }
    }

    async fn unlock(&mut self, key: i64) -> MigrateResult<()> {
        let mut state = self.db.state.lock();
        if state.locks.get(&key) == Some(&self.id) {
            state.locks.remove(&key);
        }
        Ok(())
    }

    async fn ensure_ledger(&mut self) -> MigrateResult<()> {
        self.db.state.lock().ledger.get_or_insert_default();
        Ok(())
    }

    async fn records(&mut self) -> MigrateResult<Vec<ExecutionRecord>> {
        Ok(self.db.ledger())
    }

    async fn mark_running(&mut self, script: &MigrationScript) -> MigrateResult<()> {
        self.upsert(ExecutionRecord::new(
            &script.filename,
            &script.checksum,
            RecordStatus::Running,
        ))
    }

    async fn apply(&mut self, script: &MigrationScript) -> MigrateResult<i64> {
        let started = Instant::now();
        let mut state = self.db.state.lock();

        if let Some(message) = state.injected_failures.get(&script.filename) {
            return Err(MigrationError::script_failed(&script.filename, message.clone()));
        }

        let mut tables = state.tables.clone();
        for statement in analyze::split_statements(&script.content) {
            debug!(script = %script.filename, %statement, "Simulating statement");
            apply_statement(&mut tables, &statement)
                .map_err(|message| MigrationError::script_failed(&script.filename, message))?;
        }

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let mut record = ExecutionRecord::new(
            &script.filename,
            &script.checksum,
            RecordStatus::Completed,
        );
        record.execution_time_ms = elapsed_ms;

        let ledger = state.ledger.as_mut().ok_or_else(|| {
            MigrationError::database(format!(
                "relation \"{}\" does not exist",
                self.db.ledger_table
            ))
        })?;
        ledger.insert(record.filename.clone(), record);
        state.rows.retain(|table, _| tables.contains_key(table));
        state.tables = tables;

        Ok(elapsed_ms)
    }

    async fn mark_failed(
        &mut self,
        filename: &str,
        checksum: &str,
        error: &str,
    ) -> MigrateResult<()> {
        let mut record = ExecutionRecord::new(filename, checksum, RecordStatus::Failed);
        record.error_message = Some(error.to_string());
        self.upsert(record)
    }
}

#[async_trait::async_trait]
impl SchemaCatalog for MemorySession {
    async fn snapshot(&mut self, schema: &str) -> MigrateResult<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::new();
        if !schema.eq_ignore_ascii_case(&self.db.schema) {
            return Ok(snapshot);
        }
        let state = self.db.state.lock();
        for (table, columns) in &state.tables {
            if table == &self.db.ledger_table {
                continue;
            }
            snapshot.add_table(table);
            for column in columns {
                snapshot.add_column(table, column);
            }
        }
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl SeedTarget for MemorySession {
    async fn table_exists(&mut self, schema: &str, table: &str) -> MigrateResult<bool> {
        Ok(schema.eq_ignore_ascii_case(&self.db.schema) && self.db.has_table(table))
    }

    async fn row_exists(
        &mut self,
        schema: &str,
        table: &str,
        key: &[(&str, &serde_json::Value)],
    ) -> MigrateResult<bool> {
        self.require_schema(schema, table)?;
        let state = self.db.state.lock();
        Ok(state.rows.get(table).is_some_and(|rows| {
            rows.iter()
                .any(|row| key.iter().all(|(column, value)| row.get(*column) == Some(*value)))
        }))
    }

    async fn insert_row(&mut self, schema: &str, table: &str, row: &SeedRow) -> MigrateResult<u64> {
        self.require_schema(schema, table)?;
        let mut state = self.db.state.lock();
        let columns = state
            .tables
            .get(&table.to_lowercase())
            .ok_or_else(|| MigrationError::database(format!("relation \"{}\" does not exist", table)))?;
        if let Some(unknown) = row.keys().find(|c| !columns.contains(&c.to_lowercase())) {
            return Err(MigrationError::database(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, table
            )));
        }
        state.rows.entry(table.to_string()).or_default().push(row.clone());
        Ok(1)
    }
}

/// Apply one normalized statement to the schema copy.
fn apply_statement(tables: &mut Tables, statement: &str) -> Result<(), String> {
    let analysis = analyze::analyze("statement.sql", statement);
    let words: Vec<&str> = statement.split_whitespace().collect();

    match words.as_slice() {
        ["create", rest @ ..] if is_create_table(rest) => create_table(tables, statement, &analysis),
        ["alter", "table", rest @ ..] => alter_table(tables, statement, rest, &analysis),
        ["drop", "table", rest @ ..] => drop_table(tables, rest),
        ["create", rest @ ..] if rest.contains(&"index") => require_all(tables, &analysis.references),
        ["insert", ..] | ["update", ..] | ["delete", ..] => {
            let referenced: Vec<SchemaObject> = analysis
                .references
                .iter()
                .filter(|r| matches!(r, SchemaObject::Table(_)))
                .cloned()
                .collect();
            require_all(tables, &referenced)
        }
        _ => Ok(()),
    }
}

fn is_create_table(rest: &[&str]) -> bool {
    rest.iter()
        .take_while(|w| **w != "(")
        .take(4)
        .any(|w| *w == "table")
}

fn create_table(tables: &mut Tables, statement: &str, analysis: &analyze::ScriptAnalysis) -> Result<(), String> {
    let Some(table) = analysis.creates.iter().find_map(|o| match o {
        SchemaObject::Table(name) => Some(name.clone()),
        SchemaObject::Column { .. } => None,
    }) else {
        return Ok(());
    };

    if tables.contains_key(&table) {
        if statement.contains("if not exists") {
            return Ok(());
        }
        return Err(format!("relation \"{}\" already exists", table));
    }

    require_all(tables, &analysis.references)?;

    let columns = analysis
        .creates
        .iter()
        .filter_map(|o| match o {
            SchemaObject::Column { column, .. } => Some(column.clone()),
            SchemaObject::Table(_) => None,
        })
        .collect();
    tables.insert(table, columns);
    Ok(())
}

fn alter_table(
    tables: &mut Tables,
    statement: &str,
    rest: &[&str],
    analysis: &analyze::ScriptAnalysis,
) -> Result<(), String> {
    let if_exists = rest.starts_with(&["if", "exists"]);
    let Some(table) = target_name(rest) else {
        return Ok(());
    };

    if !tables.contains_key(&table) {
        if if_exists {
            return Ok(());
        }
        return Err(format!("relation \"{}\" does not exist", table));
    }

    let foreign: Vec<SchemaObject> = analysis
        .references
        .iter()
        .filter(|r| r.table_name() != table)
        .cloned()
        .collect();
    require_all(tables, &foreign)?;

    for object in &analysis.creates {
        if let SchemaObject::Column { column, .. } = object {
            let columns = tables.entry(table.clone()).or_default();
            if columns.contains(column) && !statement.contains("if not exists") {
                return Err(format!(
                    "column \"{}\" of relation \"{}\" already exists",
                    column, table
                ));
            }
            columns.insert(column.clone());
        }
    }

    for window in words_after_drop_column(rest) {
        let (column, if_exists) = window;
        let columns = tables.entry(table.clone()).or_default();
        if !columns.shift_remove(&column) && !if_exists {
            return Err(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                column, table
            ));
        }
    }

    Ok(())
}

fn drop_table(tables: &mut Tables, rest: &[&str]) -> Result<(), String> {
    let if_exists = rest.starts_with(&["if", "exists"]);
    let names = if if_exists { &rest[2..] } else { rest };

    for name in names
        .iter()
        .take_while(|w| !matches!(**w, "cascade" | "restrict"))
        .flat_map(|w| w.split(','))
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
    {
        let name = bare(name);
        if tables.remove(&name).is_none() && !if_exists {
            return Err(format!("table \"{}\" does not exist", name));
        }
    }
    Ok(())
}

/// Column names dropped by `DROP COLUMN [IF EXISTS] <name>` clauses.
fn words_after_drop_column(rest: &[&str]) -> Vec<(String, bool)> {
    let mut dropped = Vec::new();
    let mut i = 0;
    while i + 1 < rest.len() {
        if rest[i] == "drop" && rest[i + 1] == "column" {
            let mut j = i + 2;
            let if_exists = rest.get(j) == Some(&"if") && rest.get(j + 1) == Some(&"exists");
            if if_exists {
                j += 2;
            }
            if let Some(name) = rest.get(j) {
                dropped.push((name.trim_end_matches(',').to_string(), if_exists));
            }
            i = j;
        } else if rest[i] == "drop" && !matches!(rest[i + 1], "constraint" | "default" | "not") {
            // `DROP <column>` without the COLUMN keyword.
            let mut j = i + 1;
            let if_exists = rest.get(j) == Some(&"if") && rest.get(j + 1) == Some(&"exists");
            if if_exists {
                j += 2;
            }
            if let Some(name) = rest.get(j) {
                dropped.push((name.trim_end_matches(',').to_string(), if_exists));
            }
            i = j;
        }
        i += 1;
    }
    dropped
}

/// The table named after `ALTER TABLE [IF EXISTS] [ONLY]`.
fn target_name(rest: &[&str]) -> Option<String> {
    rest.iter()
        .find(|w| !matches!(**w, "if" | "exists" | "only"))
        .map(|w| bare(w))
}

fn bare(name: &str) -> String {
    let name = name.trim_end_matches(';');
    name.rsplit_once('.')
        .map(|(_, table)| table)
        .unwrap_or(name)
        .to_string()
}

fn require_all<'a>(
    tables: &Tables,
    objects: impl IntoIterator<Item = &'a SchemaObject>,
) -> Result<(), String> {
    for object in objects {
        match object {
            SchemaObject::Table(table) if !tables.contains_key(table) => {
                return Err(format!("relation \"{}\" does not exist", table));
            }
            SchemaObject::Column { table, column } => match tables.get(table) {
                None => return Err(format!("relation \"{}\" does not exist", table)),
                Some(columns) if !columns.contains(column) => {
                    return Err(format!(
                        "column \"{}\" of relation \"{}\" does not exist",
                        column, table
                    ));
                }
                Some(_) => {}
            },
            SchemaObject::Table(_) => {}
        }
    }
    Ok(())
}
