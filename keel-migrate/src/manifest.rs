//! The expected-schema manifest.
//!
//! The manifest is maintained next to the scripts and states what the
//! database must look like once every script has run:
//!
//! ```toml
//! schema = "public"
//!
//! [tables]
//! users = ["id", "email"]
//! projects = ["id", "user_id"]
//! ```

use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::analyze::SchemaObject;
use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationScript;

/// Default catalog schema holding application tables.
pub const DEFAULT_SCHEMA: &str = "public";

/// Ground truth for the schema the scripts produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSchemaManifest {
    /// Catalog schema to inspect.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Table name to ordered column names.
    #[serde(default)]
    pub tables: IndexMap<String, IndexSet<String>>,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

impl Default for ExpectedSchemaManifest {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            tables: IndexMap::new(),
        }
    }
}

impl ExpectedSchemaManifest {
    /// Create an empty manifest for the default schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with its expected columns.
    pub fn table<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(|c| c.into().to_lowercase()).collect();
        self.tables.insert(name.into().to_lowercase(), columns);
        self
    }

    /// Set the catalog schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Parse a manifest from TOML text.
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        let parsed: Self = toml::from_str(content)
            .map_err(|e| MigrationError::manifest(format!("invalid manifest: {}", e)))?;
        Ok(parsed.normalized())
    }

    /// Load a manifest file.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrationError::manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> MigrateResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MigrationError::manifest(format!("cannot serialize manifest: {}", e)))
    }

    /// Draft a manifest from what the scripts create.
    ///
    /// The analyzer is heuristic, so the draft is a starting point to be
    /// reviewed, not ground truth.
    pub fn draft_from_scripts(scripts: &[MigrationScript]) -> Self {
        let mut manifest = Self::new();
        for script in scripts {
            for object in &script.creates {
                let columns = manifest
                    .tables
                    .entry(object.table_name().to_string())
                    .or_default();
                if let SchemaObject::Column { column, .. } = object {
                    columns.insert(column.clone());
                }
            }
        }
        manifest
    }

    /// Number of tables in the manifest.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check whether the manifest declares no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn normalized(self) -> Self {
        Self {
            schema: self.schema,
            tables: self
                .tables
                .into_iter()
                .map(|(table, columns)| {
                    (
                        table.to_lowercase(),
                        columns.into_iter().map(|c| c.to_lowercase()).collect(),
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = ExpectedSchemaManifest::from_toml(
            r#"
            [tables]
            Users = ["ID", "email"]
            projects = ["id", "user_id"]
            "#,
        )
        .unwrap();

        assert_eq!(manifest.schema, "public");
        assert_eq!(manifest.len(), 2);
        let users = &manifest.tables["users"];
        assert!(users.contains("id"));
        assert_eq!(manifest.tables.keys().next().unwrap(), "users");
    }

    #[test]
    fn test_invalid_manifest() {
        let err = ExpectedSchemaManifest::from_toml("tables = 3").unwrap_err();
        assert!(matches!(err, MigrationError::Manifest(_)));
    }

    #[test]
    fn test_builder_and_round_trip() {
        let manifest = ExpectedSchemaManifest::new()
            .with_schema("app")
            .table("users", ["id", "email"]);
        let text = manifest.to_toml().unwrap();
        let parsed = ExpectedSchemaManifest::from_toml(&text).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_draft_from_scripts() {
        let scripts = vec![
            MigrationScript::new("0001_users.sql", "CREATE TABLE users (id INT, email TEXT);"),
            MigrationScript::new("0002_bio.sql", "ALTER TABLE users ADD COLUMN bio TEXT;"),
        ];
        let manifest = ExpectedSchemaManifest::draft_from_scripts(&scripts);
        let columns: Vec<_> = manifest.tables["users"].iter().cloned().collect();
        assert_eq!(columns, vec!["email", "id", "bio"]);
    }
}
