//! CLI configuration handling.
//!
//! ```toml
//! [database]
//! url = "${DATABASE_URL}"
//!
//! [migrations]
//! directory = "./migrations"
//! manifest = "./migrations/schema.toml"
//! strictness = "revalidate-all"
//!
//! [retry]
//! attempts = 3
//! delay_ms = 2000
//!
//! [seed]
//! file = "./migrations/seed.toml"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use keel_migrate::{
    DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_KEY, LoaderConfig, LockMode, MigrationConfig as EngineConfig,
    RetryPolicy, Strictness,
};
use keel_postgres::PgConfig;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "keel.toml";

/// Default migrations directory (relative to project root)
pub const MIGRATIONS_DIR: &str = "./migrations";

/// Default manifest path (relative to project root)
pub const MANIFEST_PATH: &str = "./migrations/schema.toml";

/// Keel CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Migration configuration
    pub migrations: MigrationsConfig,

    /// Connection retry configuration
    pub retry: RetryConfig,

    /// Seed configuration
    pub seed: SeedConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> CliResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Get database URL from config or environment
    pub fn database_url(&self) -> CliResult<String> {
        // Try config first
        if let Some(ref url) = self.database.url {
            let expanded = expand_env_var(url);
            if !expanded.is_empty() && !expanded.contains("${") {
                return Ok(expanded);
            }
        }

        // Try environment variable
        std::env::var("DATABASE_URL").map_err(|_| {
            CliError::Config(
                "Database URL not found. Set DATABASE_URL environment variable or configure [database] url in keel.toml"
                    .to_string(),
            )
        })
    }

    /// Driver configuration for the configured database
    pub fn pg_config(&self) -> CliResult<PgConfig> {
        let url = self.database_url()?;
        let mut builder = PgConfig::builder()
            .url(url)
            .ledger_table(&self.migrations.ledger_table);
        if let Some(secs) = self.database.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Engine configuration
    pub fn engine_config(&self) -> EngineConfig {
        let migrations = &self.migrations;
        let lock_mode = if migrations.wait_for_lock {
            LockMode::wait(Duration::from_secs(migrations.lock_timeout_secs))
        } else {
            LockMode::FailFast
        };

        let mut loader = LoaderConfig::default();
        if let Some(ref suffixes) = migrations.excluded_suffixes {
            loader.excluded_suffixes = suffixes.clone();
        }

        EngineConfig::new()
            .migrations_dir(&migrations.directory)
            .manifest_path(&migrations.manifest)
            .lock_key(migrations.lock_key)
            .lock_mode(lock_mode)
            .strictness(migrations.strictness)
            .retry(self.retry.policy())
            .loader(loader)
    }

    /// Find the seed file: the configured path or a conventional location
    pub fn seed_file(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.seed.file {
            return Some(path.clone());
        }

        let dir = &self.migrations.directory;
        [dir.join("seed.toml"), dir.join("seed.json")]
            .into_iter()
            .find(|p| p.exists())
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL; `${VAR}` references are expanded
    pub url: Option<String>,

    /// Connection timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory for migration files
    pub directory: PathBuf,

    /// Expected-schema manifest
    pub manifest: PathBuf,

    /// Ledger table name
    pub ledger_table: String,

    /// Advisory lock key
    pub lock_key: i64,

    /// Ledger trust level
    pub strictness: Strictness,

    /// Wait for the lock instead of failing fast
    pub wait_for_lock: bool,

    /// How long to wait for the lock, in seconds
    pub lock_timeout_secs: u64,

    /// File suffixes that are never loaded
    pub excluded_suffixes: Option<Vec<String>>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(MIGRATIONS_DIR),
            manifest: PathBuf::from(MANIFEST_PATH),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            lock_key: DEFAULT_LOCK_KEY,
            strictness: Strictness::default(),
            wait_for_lock: false,
            lock_timeout_secs: 300,
            excluded_suffixes: None,
        }
    }
}

/// Connection retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total connection attempts
    pub attempts: u32,

    /// Delay between attempts, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.attempts,
            delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    /// The engine retry policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .attempts(self.attempts)
            .delay(Duration::from_millis(self.delay_ms))
    }
}

/// Seed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Path to the seed file (TOML or JSON)
    pub file: Option<PathBuf>,

    /// Seed automatically after `keel migrate`
    pub auto_seed: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            file: None,
            auto_seed: true,
        }
    }
}

static BRACED_VAR: LazyLock<regex_lite::Regex> =
    LazyLock::new(|| regex_lite::Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

static BARE_VAR: LazyLock<regex_lite::Regex> =
    LazyLock::new(|| regex_lite::Regex::new(r"\$([A-Z_][A-Z0-9_]*)").expect("valid regex"));

/// Expand environment variables in a string
pub fn expand_env_var(s: &str) -> String {
    let mut result = s.to_string();

    // Match ${VAR} pattern
    for cap in BRACED_VAR.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    // Also match $VAR pattern (no braces)
    for cap in BARE_VAR.captures_iter(&result.clone()) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
