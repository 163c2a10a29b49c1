//! Schema validation against the expected-schema manifest.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::Serialize;

use crate::analyze::SchemaObject;
use crate::error::MigrateResult;
use crate::manifest::ExpectedSchemaManifest;

/// Live table and column names read from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, IndexSet<String>>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a column of a table, creating the table entry if needed.
    pub fn add_column(&mut self, table: &str, column: &str) {
        self.tables
            .entry(table.to_lowercase())
            .or_default()
            .insert(column.to_lowercase());
    }

    /// Record a table with no columns yet.
    pub fn add_table(&mut self, table: &str) {
        self.tables.entry(table.to_lowercase()).or_default();
    }

    /// Builder form of [`add_table`](Self::add_table) plus columns.
    pub fn with_table<I, S>(mut self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_table(table);
        for column in columns {
            self.add_column(table, column.as_ref());
        }
        self
    }

    /// Check if a table exists (case-insensitive).
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    /// Check if a column exists (case-insensitive).
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(&table.to_lowercase())
            .is_some_and(|columns| columns.contains(&column.to_lowercase()))
    }

    /// Check if a dependency token exists.
    pub fn contains(&self, object: &SchemaObject) -> bool {
        match object {
            SchemaObject::Table(table) => self.has_table(table),
            SchemaObject::Column { table, column } => self.has_column(table, column),
        }
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Columns of a table.
    pub fn columns(&self, table: &str) -> Option<&IndexSet<String>> {
        self.tables.get(&table.to_lowercase())
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check whether the snapshot has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Reads schema snapshots from a live database.
#[async_trait::async_trait]
pub trait SchemaCatalog: Send {
    /// Snapshot every table and column of `schema`, excluding the ledger.
    async fn snapshot(&mut self, schema: &str) -> MigrateResult<SchemaSnapshot>;
}

/// A column the manifest expects but the database lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingColumn {
    /// Table name.
    pub table: String,
    /// Column name.
    pub column: String,
}

/// Outcome of comparing a snapshot with the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True when no table or column is missing.
    pub is_valid: bool,
    /// Manifest tables absent from the database.
    pub missing_tables: Vec<String>,
    /// Manifest columns absent from present tables.
    pub missing_columns: Vec<MissingColumn>,
    /// Database tables the manifest does not mention. Informational.
    pub extra_tables: Vec<String>,
    /// Number of manifest tables found in the database.
    pub tables_verified: usize,
}

impl ValidationResult {
    /// Missing tables and columns as dependency tokens.
    pub fn missing_objects(&self) -> Vec<SchemaObject> {
        self.missing_tables
            .iter()
            .map(SchemaObject::table)
            .chain(
                self.missing_columns
                    .iter()
                    .map(|m| SchemaObject::column(&m.table, &m.column)),
            )
            .collect()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        if self.is_valid {
            return format!("{} tables verified", self.tables_verified);
        }

        let mut parts = Vec::new();

        if !self.missing_tables.is_empty() {
            parts.push(format!(
                "missing tables: {}",
                self.missing_tables.join(", ")
            ));
        }

        if !self.missing_columns.is_empty() {
            let columns: Vec<_> = self
                .missing_columns
                .iter()
                .map(|m| format!("{}.{}", m.table, m.column))
                .collect();
            parts.push(format!("missing columns: {}", columns.join(", ")));
        }

        parts.join("; ")
    }
}

/// Compare a live snapshot against the manifest.
pub fn validate(manifest: &ExpectedSchemaManifest, snapshot: &SchemaSnapshot) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (table, columns) in &manifest.tables {
        if !snapshot.has_table(table) {
            result.missing_tables.push(table.to_lowercase());
            continue;
        }
        result.tables_verified += 1;
        for column in columns {
            if !snapshot.has_column(table, column) {
                result.missing_columns.push(MissingColumn {
                    table: table.to_lowercase(),
                    column: column.to_lowercase(),
                });
            }
        }
    }

    result.extra_tables = snapshot
        .table_names()
        .filter(|name| {
            !manifest
                .tables
                .keys()
                .any(|table| table.eq_ignore_ascii_case(name))
        })
        .map(String::from)
        .collect();

    result.is_valid = result.missing_tables.is_empty() && result.missing_columns.is_empty();
    result
}

/// Catalog queries for PostgreSQL.
pub mod postgres_queries {
    /// Every column of every base table in a schema.
    pub const COLUMNS: &str = r#"
        SELECT
            c.table_name::text,
            c.column_name::text
        FROM information_schema.columns c
        JOIN information_schema.tables t
            ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        WHERE c.table_schema = $1::text AND t.table_type = 'BASE TABLE'
        ORDER BY c.table_name, c.ordinal_position
    "#;

    /// Base tables in a schema, including tables without columns.
    pub const TABLES: &str = r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = $1::text AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn manifest() -> ExpectedSchemaManifest {
        ExpectedSchemaManifest::new()
            .table("users", ["id", "email"])
            .table("projects", ["id", "user_id"])
    }

    #[test]
    fn test_valid_schema() {
        let snapshot = SchemaSnapshot::new()
            .with_table("users", ["id", "email", "created_at"])
            .with_table("projects", ["id", "user_id"]);

        let result = validate(&manifest(), &snapshot);
        assert!(result.is_valid);
        assert_eq!(result.tables_verified, 2);
        assert!(result.extra_tables.is_empty());
        assert_eq!(result.summary(), "2 tables verified");
    }

    #[test]
    fn test_missing_table_and_column() {
        let snapshot = SchemaSnapshot::new()
            .with_table("users", ["id"])
            .with_table("audit_log", ["id"]);

        let result = validate(&manifest(), &snapshot);
        assert!(!result.is_valid);
        assert_eq!(result.missing_tables, vec!["projects"]);
        assert_eq!(
            result.missing_columns,
            vec![MissingColumn {
                table: "users".into(),
                column: "email".into()
            }]
        );
        assert_eq!(result.extra_tables, vec!["audit_log"]);
        assert_eq!(result.tables_verified, 1);
        assert!(result.summary().contains("users.email"));
    }

    #[test]
    fn test_names_compare_case_insensitively() {
        let snapshot = SchemaSnapshot::new()
            .with_table("Users", ["ID", "Email"])
            .with_table("PROJECTS", ["id", "USER_ID"]);

        assert!(validate(&manifest(), &snapshot).is_valid);
    }

    #[test]
    fn test_missing_objects() {
        let result = validate(&manifest(), &SchemaSnapshot::new().with_table("users", ["id"]));
        let missing = result.missing_objects();
        assert!(missing.contains(&SchemaObject::table("projects")));
        assert!(missing.contains(&SchemaObject::column("users", "email")));
    }

    #[test]
    fn test_snapshot_contains() {
        let snapshot = SchemaSnapshot::new().with_table("users", ["id"]);
        assert!(snapshot.contains(&SchemaObject::table("users")));
        assert!(snapshot.contains(&SchemaObject::column("users", "id")));
        assert!(!snapshot.contains(&SchemaObject::column("users", "email")));
    }
}
