//! CLI command implementations.

pub mod manifest;
pub mod migrate;
pub mod plan;
pub mod rehearse;
pub mod seed;
pub mod status;
pub mod validate;
pub mod version;

use std::path::{Path, PathBuf};

use keel_migrate::{
    ExpectedSchemaManifest, MigrateResult, MigrationConfig, MigrationEngine, MigrationError,
    SeedFile,
};
use keel_postgres::PgMigrationDatabase;

use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output;

/// Configuration shared by every command, after command-line overrides.
#[derive(Debug, Clone)]
pub struct Project {
    /// Effective configuration.
    pub config: Config,
}

impl Project {
    /// Load the config file and apply the global flags.
    pub fn load(
        config_path: &Path,
        dir: Option<PathBuf>,
        manifest: Option<PathBuf>,
    ) -> CliResult<Self> {
        let mut config = Config::load_or_default(config_path)?;
        if let Some(dir) = dir {
            // A directory override moves the default manifest along with it.
            let default_manifest = Config::default().migrations.manifest;
            if manifest.is_none() && config.migrations.manifest == default_manifest {
                config.migrations.manifest = dir.join("schema.toml");
            }
            config.migrations.directory = dir;
        }
        if let Some(manifest) = manifest {
            config.migrations.manifest = manifest;
        }
        Ok(Self { config })
    }

    /// Engine configuration.
    pub fn engine_config(&self) -> MigrationConfig {
        self.config.engine_config()
    }

    /// Engine with the default configuration.
    pub fn engine(&self) -> MigrationEngine {
        MigrationEngine::new(self.engine_config())
    }

    /// Load the manifest named by the configuration.
    pub async fn manifest(&self) -> CliResult<ExpectedSchemaManifest> {
        Ok(ExpectedSchemaManifest::load(&self.config.migrations.manifest).await?)
    }

    /// Load seed datasets, if a seed file is configured or present.
    pub async fn seeds(&self, path: Option<&Path>) -> MigrateResult<Option<SeedFile>> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => self.config.seed_file(),
        };
        match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading seed file");
                Ok(Some(SeedFile::load(&path).await?))
            }
            None => Ok(None),
        }
    }

    /// Open a database session, retrying transient failures.
    pub async fn connect(&self) -> MigrateResult<PgMigrationDatabase> {
        let pg = self.config.pg_config().map_err(|e| match e {
            CliError::Config(msg) => MigrationError::Config(msg),
            other => MigrationError::config(other.to_string()),
        })?;
        tracing::info!(url = %pg.redacted_url(), "Connecting");
        PgMigrationDatabase::connect_with_retry(&pg, &self.config.retry.policy()).await
    }
}

/// Print the paths a command works with.
pub fn print_paths(project: &Project) {
    let migrations = &project.config.migrations;
    output::kv("Migrations", &migrations.directory.display().to_string());
    output::kv("Manifest", &migrations.manifest.display().to_string());
    output::newline();
}
