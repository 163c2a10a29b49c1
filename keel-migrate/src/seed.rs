//! Baseline data seeding.
//!
//! Seeds are declarative datasets loaded from TOML or JSON:
//!
//! ```toml
//! [[datasets]]
//! table = "roles"
//! key = ["name"]
//! required = true
//! rows = [{ name = "admin" }, { name = "member" }]
//! ```
//!
//! Each row is looked up by its natural key and inserted only when absent,
//! so seeding can run after every migration.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};

/// One seed row: column name to value.
pub type SeedRow = IndexMap<String, serde_json::Value>;

/// Seed file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedFileType {
    /// JSON data file (.json)
    Json,
    /// TOML data file (.toml)
    Toml,
}

impl SeedFileType {
    /// Detect the format from a path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Rows for one table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SeedDataset {
    /// Target table.
    pub table: String,
    /// Natural key columns used to detect existing rows.
    pub key: Vec<String>,
    /// Whether a missing table fails the run instead of warning.
    #[serde(default)]
    pub required: bool,
    /// Rows to ensure.
    #[serde(default)]
    pub rows: Vec<SeedRow>,
}

/// A parsed seed file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SeedFile {
    /// Datasets, seeded in file order.
    #[serde(default)]
    pub datasets: Vec<SeedDataset>,
}

impl SeedFile {
    /// Parse TOML seed data.
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        let file: Self = toml::from_str(content)
            .map_err(|e| MigrationError::seed(format!("invalid seed file: {}", e)))?;
        file.check()?;
        Ok(file)
    }

    /// Parse JSON seed data.
    pub fn from_json(content: &str) -> MigrateResult<Self> {
        let file: Self = serde_json::from_str(content)
            .map_err(|e| MigrationError::seed(format!("invalid seed file: {}", e)))?;
        file.check()?;
        Ok(file)
    }

    /// Load a seed file, choosing the format from its extension.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let file_type = SeedFileType::from_path(path).ok_or_else(|| {
            MigrationError::seed(format!(
                "Unsupported seed file type: {}. Supported: .json, .toml",
                path.display()
            ))
        })?;

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrationError::seed(format!("cannot read {}: {}", path.display(), e))
        })?;

        match file_type {
            SeedFileType::Json => Self::from_json(&content),
            SeedFileType::Toml => Self::from_toml(&content),
        }
    }

    fn check(&self) -> MigrateResult<()> {
        for dataset in &self.datasets {
            if dataset.key.is_empty() {
                return Err(MigrationError::seed(format!(
                    "dataset for table '{}' declares no key columns",
                    dataset.table
                )));
            }
        }
        Ok(())
    }
}

/// Row-level access needed to seed a database.
#[async_trait::async_trait]
pub trait SeedTarget: Send {
    /// Check whether a table exists in `schema`.
    async fn table_exists(&mut self, schema: &str, table: &str) -> MigrateResult<bool>;

    /// Check whether a row of `schema.table` matching every key column exists.
    async fn row_exists(
        &mut self,
        schema: &str,
        table: &str,
        key: &[(&str, &serde_json::Value)],
    ) -> MigrateResult<bool>;

    /// Insert one row into `schema.table`, returning the number of rows inserted.
    async fn insert_row(&mut self, schema: &str, table: &str, row: &SeedRow) -> MigrateResult<u64>;
}

/// Counts for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReport {
    /// Target table.
    pub table: String,
    /// Rows actually inserted.
    pub inserted: u64,
    /// Rows that already existed.
    pub skipped: u64,
    /// Set when the dataset was skipped because its table is missing.
    pub table_missing: bool,
}

/// Outcome of a seeding pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    /// Per-dataset counts.
    pub datasets: Vec<DatasetReport>,
    /// Advisory warnings.
    pub warnings: Vec<String>,
}

impl SeedReport {
    /// Total rows inserted.
    pub fn inserted(&self) -> u64 {
        self.datasets.iter().map(|d| d.inserted).sum()
    }

    /// Total rows already present.
    pub fn skipped(&self) -> u64 {
        self.datasets.iter().map(|d| d.skipped).sum()
    }
}

/// Ensures seed rows exist, inserting only missing ones.
#[derive(Debug, Clone)]
pub struct SeedVerifier {
    seeds: SeedFile,
    schema: String,
}

impl SeedVerifier {
    /// Create a verifier for the given seeds and catalog schema.
    pub fn new(seeds: SeedFile, schema: impl Into<String>) -> Self {
        Self {
            seeds,
            schema: schema.into(),
        }
    }

    /// Seed every dataset.
    ///
    /// A missing optional table is skipped with a warning; a missing
    /// required table or a row without a key column aborts seeding.
    pub async fn run<T: SeedTarget + ?Sized>(&self, target: &mut T) -> MigrateResult<SeedReport> {
        let mut report = SeedReport::default();

        for dataset in &self.seeds.datasets {
            let mut counts = DatasetReport {
                table: dataset.table.clone(),
                ..Default::default()
            };

            if !target.table_exists(&self.schema, &dataset.table).await? {
                if dataset.required {
                    return Err(MigrationError::seed(format!(
                        "required seed table '{}' does not exist",
                        dataset.table
                    )));
                }
                let message = format!(
                    "seed table '{}' does not exist; dataset skipped",
                    dataset.table
                );
                warn!("{}", message);
                report.warnings.push(message);
                counts.table_missing = true;
                report.datasets.push(counts);
                continue;
            }

            for (index, row) in dataset.rows.iter().enumerate() {
                let key = key_values(dataset, row).ok_or_else(|| {
                    MigrationError::seed(format!(
                        "row {} of table '{}' is missing a key column ({})",
                        index + 1,
                        dataset.table,
                        dataset.key.join(", ")
                    ))
                })?;

                if target.row_exists(&self.schema, &dataset.table, &key).await? {
                    counts.skipped += 1;
                    continue;
                }
                counts.inserted += target.insert_row(&self.schema, &dataset.table, row).await?;
            }

            debug!(
                table = %dataset.table,
                inserted = counts.inserted,
                skipped = counts.skipped,
                "Seeded dataset"
            );
            report.datasets.push(counts);
        }

        info!(
            inserted = report.inserted(),
            skipped = report.skipped(),
            "Seeding complete"
        );
        Ok(report)
    }
}

fn key_values<'a>(
    dataset: &'a SeedDataset,
    row: &'a SeedRow,
) -> Option<Vec<(&'a str, &'a serde_json::Value)>> {
    dataset
        .key
        .iter()
        .map(|column| row.get(column).map(|value| (column.as_str(), value)))
        .collect()
}

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Convert a JSON value to a SQL literal.
pub fn value_to_sql(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => {
            if *b {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => match s.as_str() {
            "now()" | "NOW()" => "CURRENT_TIMESTAMP".to_string(),
            "uuid()" | "UUID()" => "gen_random_uuid()".to_string(),
            _ => format!("'{}'", s.replace('\'', "''")),
        },
        serde_json::Value::Array(arr) => {
            let items = arr.iter().map(value_to_sql).collect::<Vec<_>>().join(", ");
            format!("ARRAY[{}]", items)
        }
        serde_json::Value::Object(_) => {
            format!("'{}'", value.to_string().replace('\'', "''"))
        }
    }
}

/// Schema-qualified, quoted table name.
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// `SELECT 1` probe for a row matching the key columns.
pub fn exists_sql(schema: &str, table: &str, key: &[(&str, &serde_json::Value)]) -> String {
    let predicate = key
        .iter()
        .map(|(column, value)| match value {
            serde_json::Value::Null => format!("{} IS NULL", quote_ident(column)),
            _ => format!("{} = {}", quote_ident(column), value_to_sql(value)),
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "SELECT 1 FROM {} WHERE {} LIMIT 1",
        qualified_name(schema, table),
        predicate
    )
}

/// `INSERT` statement for one row.
pub fn insert_sql(schema: &str, table: &str, row: &SeedRow) -> String {
    let columns = row
        .keys()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let values = row.values().map(value_to_sql).collect::<Vec<_>>().join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_name(schema, table),
        columns,
        values
    )
}
