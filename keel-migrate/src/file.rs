//! Migration script loading.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::analyze::{self, SchemaObject};
use crate::error::{MigrateResult, MigrationError};

/// A versioned SQL change script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationScript {
    /// File name, including the `.sql` extension. Unique per run.
    pub filename: String,
    /// Path the script was read from.
    #[serde(skip)]
    pub path: PathBuf,
    /// Raw script text.
    #[serde(skip)]
    pub content: String,
    /// Hex SHA-256 of the raw bytes.
    pub checksum: String,
    /// Tables and columns the script defines.
    pub creates: BTreeSet<SchemaObject>,
    /// Tables and columns the script expects to exist.
    pub references: BTreeSet<SchemaObject>,
    /// Filenames of scripts that must run first. Filled in by the resolver.
    pub dependencies: BTreeSet<String>,
    /// Whether the script is safe to re-run.
    pub idempotent: bool,
    /// Advisory analysis warnings.
    pub warnings: Vec<String>,
}

impl MigrationScript {
    /// Create a script from its filename and content, analyzing it.
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        let filename = filename.into();
        let content = content.into();
        let checksum = compute_checksum(content.as_bytes());
        let analysis = analyze::analyze(&filename, &content);

        Self {
            path: PathBuf::from(&filename),
            filename,
            content,
            checksum,
            creates: analysis.creates,
            references: analysis.references,
            dependencies: BTreeSet::new(),
            idempotent: analysis.idempotent,
            warnings: analysis.warnings,
        }
    }

    /// Set the path for this script.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// The sequence prefix (`0001` in `0001_create_users.sql`).
    pub fn sequence(&self) -> &str {
        self.filename
            .split_once('_')
            .map(|(sequence, _)| sequence)
            .unwrap_or_else(|| self.stem())
    }

    /// The filename without its `.sql` extension.
    pub fn stem(&self) -> &str {
        self.filename
            .strip_suffix(".sql")
            .unwrap_or(&self.filename)
    }
}

/// Compute the checksum of script bytes.
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Options controlling which files the loader picks up.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Suffixes marking a `.sql` file as disabled or a backup.
    pub excluded_suffixes: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            excluded_suffixes: vec![
                ".disabled.sql".to_string(),
                ".bak.sql".to_string(),
                ".backup.sql".to_string(),
                ".skip.sql".to_string(),
            ],
        }
    }
}

impl LoaderConfig {
    /// Check if a file name should be loaded.
    pub fn accepts(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        lower.ends_with(".sql")
            && !self
                .excluded_suffixes
                .iter()
                .any(|suffix| lower.ends_with(&suffix.to_lowercase()))
    }
}

/// Reads migration scripts from a directory.
pub struct ScriptLoader {
    dir: PathBuf,
    config: LoaderConfig,
}

impl ScriptLoader {
    /// Create a loader for a directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            config: LoaderConfig::default(),
        }
    }

    /// Replace the loader options.
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// The scripts directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every script, sorted by filename.
    ///
    /// Fails if the directory is missing, any matched file cannot be read,
    /// or any script is empty after trimming.
    pub async fn load(&self) -> MigrateResult<Vec<MigrationScript>> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Err(MigrationError::DirectoryNotFound(self.dir.clone()));
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.config.accepts(name) {
                debug!(file = %name, "Skipping non-migration file");
                continue;
            }
            if entry.file_type().await?.is_dir() {
                continue;
            }
            paths.push(path);
        }

        paths.sort();

        let mut scripts = Vec::with_capacity(paths.len());
        for path in paths {
            scripts.push(self.read_script(&path).await?);
        }

        info!(count = scripts.len(), dir = %self.dir.display(), "Loaded migration scripts");
        Ok(scripts)
    }

    async fn read_script(&self, path: &Path) -> MigrateResult<MigrationScript> {
        let unreadable = |message: String| MigrationError::UnreadableScript {
            path: path.to_path_buf(),
            message,
        };

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| unreadable("file name is not valid UTF-8".to_string()))?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        let content = String::from_utf8(bytes).map_err(|e| unreadable(e.to_string()))?;

        if content.trim().is_empty() {
            return Err(MigrationError::EmptyScript(filename));
        }

        let mut script = MigrationScript::new(filename, content).with_path(path);
        if !has_sequence_prefix(&script.filename) {
            let message = format!(
                "{}: file name does not follow <sequence>_<description>.sql",
                script.filename
            );
            warn!("{}", message);
            script.warnings.push(message);
        }

        Ok(script)
    }
}

fn has_sequence_prefix(filename: &str) -> bool {
    filename
        .split_once('_')
        .is_some_and(|(sequence, rest)| !sequence.is_empty() && rest.len() > ".sql".len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_compute_checksum() {
        let checksum1 = compute_checksum(b"CREATE TABLE users();");
        let checksum2 = compute_checksum(b"CREATE TABLE users();");
        let checksum3 = compute_checksum(b"DROP TABLE users;");

        assert_eq!(checksum1, checksum2);
        assert_ne!(checksum1, checksum3);
        assert_eq!(checksum1.len(), 64);
    }

    #[test]
    fn test_script_sequence() {
        let script = MigrationScript::new("0001_create_users.sql", "CREATE TABLE users (id INT);");
        assert_eq!(script.sequence(), "0001");
        assert_eq!(script.stem(), "0001_create_users");
        assert!(script.creates.contains(&SchemaObject::table("users")));
    }

    #[test]
    fn test_loader_config_accepts() {
        let config = LoaderConfig::default();
        assert!(config.accepts("0001_init.sql"));
        assert!(config.accepts("0001_INIT.SQL"));
        assert!(!config.accepts("0001_init.disabled.sql"));
        assert!(!config.accepts("0001_init.bak.sql"));
        assert!(!config.accepts("0001_init.sql.bak"));
        assert!(!config.accepts("README.md"));
    }

    #[tokio::test]
    async fn test_load_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0002_b.sql", "CREATE TABLE b (id INT);");
        write(dir.path(), "0001_a.sql", "CREATE TABLE a (id INT);");
        write(dir.path(), "0003_c.disabled.sql", "CREATE TABLE c (id INT);");
        write(dir.path(), "notes.txt", "ignore me");

        let scripts = ScriptLoader::new(dir.path()).load().await.unwrap();
        let names: Vec<_> = scripts.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["0001_a.sql", "0002_b.sql"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScriptLoader::new(dir.path().join("nope"))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::DirectoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_script_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_a.sql", "CREATE TABLE a (id INT);");
        write(dir.path(), "0002_empty.sql", "  \n\t ");

        let err = ScriptLoader::new(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, MigrationError::EmptyScript(ref name) if name == "0002_empty.sql"));
    }

    #[tokio::test]
    async fn test_non_utf8_script_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001_bin.sql"), [0xff, 0xfe, 0x00]).unwrap();

        let err = ScriptLoader::new(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, MigrationError::UnreadableScript { .. }));
    }

    #[tokio::test]
    async fn test_name_without_sequence_warns() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "init.sql", "CREATE TABLE a (id INT);");

        let scripts = ScriptLoader::new(dir.path()).load().await.unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].warnings[0].contains("<sequence>_<description>"));
    }
}
