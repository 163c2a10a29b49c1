//! Migration engine implementation.
//!
//! The engine loads and orders the scripts as a preflight, then drives one
//! exclusive database session through
//! `AcquireLock → EnsureLedger → Validate(pre) → ExecuteEach →
//! Validate(post) → Seed → ReleaseLock`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyze::SchemaObject;
use crate::error::{FailureKind, MigrateResult, MigrationError};
use crate::file::{LoaderConfig, MigrationScript, ScriptLoader};
use crate::graph::{self, ResolvedPlan};
use crate::history::{DEFAULT_LOCK_KEY, ExecutionLedger, ExecutionRecord, RecordStatus};
use crate::manifest::ExpectedSchemaManifest;
use crate::retry::RetryPolicy;
use crate::seed::{SeedFile, SeedReport, SeedTarget, SeedVerifier};
use crate::validate::{self, SchemaCatalog, ValidationResult};

/// How far completed ledger records are trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strictness {
    /// Always trust completed records with a matching checksum.
    TrustLedger,
    /// On drift, distrust completed scripts that create a missing object.
    RevalidateAffected,
    /// On drift, distrust every completed record.
    #[default]
    RevalidateAll,
}

impl Strictness {
    /// The configuration spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrustLedger => "trust-ledger",
            Self::RevalidateAffected => "revalidate-affected",
            Self::RevalidateAll => "revalidate-all",
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strictness {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "trust-ledger" | "trust" => Ok(Self::TrustLedger),
            "revalidate-affected" | "affected" => Ok(Self::RevalidateAffected),
            "revalidate-all" | "all" => Ok(Self::RevalidateAll),
            other => Err(MigrationError::config(format!(
                "unknown strictness '{}' (expected trust-ledger, revalidate-affected or revalidate-all)",
                other
            ))),
        }
    }
}

/// What to do when another migrator holds the lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    /// Fail immediately with [`MigrationError::LockContention`].
    #[default]
    FailFast,
    /// Poll until the lock is free or the timeout elapses.
    Wait {
        /// Delay between attempts.
        poll_interval: Duration,
        /// Give up after this long.
        timeout: Duration,
    },
}

impl LockMode {
    /// Wait mode with a one second poll interval.
    pub fn wait(timeout: Duration) -> Self {
        Self::Wait {
            poll_interval: Duration::from_secs(1),
            timeout,
        }
    }
}

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// Path to the expected-schema manifest.
    pub manifest_path: PathBuf,
    /// Advisory lock key.
    pub lock_key: i64,
    /// Behavior on lock contention.
    pub lock_mode: LockMode,
    /// Ledger trust policy.
    pub strictness: Strictness,
    /// Retry policy for connecting.
    pub retry: RetryPolicy,
    /// Whether to run in dry-run mode.
    pub dry_run: bool,
    /// Whether to skip seeding after a successful run.
    pub skip_seed: bool,
    /// Which files the loader picks up.
    pub loader: LoaderConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            manifest_path: PathBuf::from("./migrations/schema.toml"),
            lock_key: DEFAULT_LOCK_KEY,
            lock_mode: LockMode::default(),
            strictness: Strictness::default(),
            retry: RetryPolicy::default(),
            dry_run: false,
            skip_seed: false,
            loader: LoaderConfig::default(),
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the manifest path.
    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    /// Set the advisory lock key.
    pub fn lock_key(mut self, key: i64) -> Self {
        self.lock_key = key;
        self
    }

    /// Set the lock contention behavior.
    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Set the ledger trust policy.
    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Skip seeding.
    pub fn skip_seed(mut self, skip: bool) -> Self {
        self.skip_seed = skip;
        self
    }

    /// Replace the loader options.
    pub fn loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }
}

/// Everything a database backend must provide to run migrations.
pub trait MigrationDatabase: ExecutionLedger + SchemaCatalog + SeedTarget {}

impl<T: ExecutionLedger + SchemaCatalog + SeedTarget + ?Sized> MigrationDatabase for T {}

/// The output of the preflight: a frozen plan and the manifest.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    /// Scripts in execution order.
    pub plan: ResolvedPlan,
    /// Expected schema after the run.
    pub manifest: ExpectedSchemaManifest,
}

/// Structured result of a run, reported to deployment tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// True only when every step succeeded.
    pub success: bool,
    /// Scripts executed (in dry-run: scripts that would execute).
    pub migrations_run: usize,
    /// Scripts skipped as already completed.
    pub migrations_skipped: usize,
    /// Scripts in the plan.
    pub total_migrations: usize,
    /// Manifest tables found after the run.
    pub tables_verified: usize,
    /// Whether the final schema matched the manifest.
    pub schema_valid: bool,
    /// Fatal errors. Empty on success.
    pub errors: Vec<String>,
    /// Advisory warnings.
    pub warnings: Vec<String>,
    /// Executed filenames, in order.
    pub executed: Vec<String>,
    /// Skipped filenames, in order.
    pub skipped: Vec<String>,
    /// Classification of the failure, if any.
    pub failure: Option<FailureKind>,
    /// Seeding counts, when seeding ran.
    pub seed: Option<SeedReport>,
    /// Wall time of the run.
    pub duration_ms: u64,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Whether the run had to wait for another migrator.
    pub waited_for_lock: bool,
}

impl RunReport {
    /// A report for a run that failed before reaching the database.
    pub fn from_error(err: &MigrationError, dry_run: bool) -> Self {
        Self {
            success: false,
            errors: vec![err.to_string()],
            failure: Some(err.kind()),
            dry_run,
            ..Default::default()
        }
    }

    /// Get a summary of the report.
    pub fn summary(&self) -> String {
        if !self.success {
            return format!(
                "Migration failed ({} run, {} skipped): {}",
                self.migrations_run,
                self.migrations_skipped,
                self.errors.join("; ")
            );
        }

        let verb = if self.dry_run { "would run" } else { "run" };
        format!(
            "{} {}, {} skipped of {}; {} tables verified in {}ms",
            self.migrations_run,
            verb,
            self.migrations_skipped,
            self.total_migrations,
            self.tables_verified,
            self.duration_ms
        )
    }
}

/// Mutable state of one run.
#[derive(Debug)]
pub struct RunContext {
    started: Instant,
    dry_run: bool,
    total: usize,
    executed: Vec<String>,
    skipped: Vec<String>,
    completed_this_run: Vec<(String, String)>,
    warnings: Vec<String>,
    tables_verified: usize,
    schema_valid: bool,
    waited_for_lock: bool,
    seed: Option<SeedReport>,
}

impl RunContext {
    fn new(prepared: &PreparedRun, dry_run: bool) -> Self {
        Self {
            started: Instant::now(),
            dry_run,
            total: prepared.plan.len(),
            executed: Vec::new(),
            skipped: Vec::new(),
            completed_this_run: Vec::new(),
            warnings: prepared.plan.warnings.clone(),
            tables_verified: 0,
            schema_valid: false,
            waited_for_lock: false,
            seed: None,
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn finish(self, outcome: MigrateResult<()>) -> RunReport {
        let (success, errors, failure) = match outcome {
            Ok(()) => (true, Vec::new(), None),
            Err(err) => (false, vec![err.to_string()], Some(err.kind())),
        };

        RunReport {
            success,
            migrations_run: self.executed.len(),
            migrations_skipped: self.skipped.len(),
            total_migrations: self.total,
            tables_verified: self.tables_verified,
            schema_valid: self.schema_valid,
            errors,
            warnings: self.warnings,
            executed: self.executed,
            skipped: self.skipped,
            failure,
            seed: self.seed,
            duration_ms: self.started.elapsed().as_millis() as u64,
            dry_run: self.dry_run,
            waited_for_lock: self.waited_for_lock,
        }
    }
}

/// Where a script stands relative to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptState {
    /// No record yet.
    Pending,
    /// Completed with the current checksum.
    Applied,
    /// Completed, but the file changed since.
    Changed,
    /// Last attempt failed.
    Failed,
    /// Marked running; the process likely died mid-script.
    Interrupted,
    /// Recorded in the ledger, but no file exists.
    Orphaned,
}

/// Status of one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Script filename.
    pub filename: String,
    /// Ledger state.
    pub state: ScriptState,
    /// The ledger record, if any.
    pub record: Option<ExecutionRecord>,
}

/// Migration status information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Scripts in execution order, followed by orphaned records.
    pub entries: Vec<StatusEntry>,
}

impl MigrationStatus {
    /// Number of entries in a given state.
    pub fn count(&self, state: ScriptState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// Whether anything would run.
    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(
                e.state,
                ScriptState::Pending
                    | ScriptState::Changed
                    | ScriptState::Failed
                    | ScriptState::Interrupted
            )
        })
    }
}

/// The main migration engine.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    config: MigrationConfig,
    seeds: Option<SeedFile>,
}

impl MigrationEngine {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            config,
            seeds: None,
        }
    }

    /// Seed these datasets after a successful run.
    pub fn with_seeds(mut self, seeds: SeedFile) -> Self {
        self.seeds = Some(seeds);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Load and order the scripts without touching a database.
    pub async fn plan(&self) -> MigrateResult<ResolvedPlan> {
        let scripts = ScriptLoader::new(&self.config.migrations_dir)
            .with_config(self.config.loader.clone())
            .load()
            .await?;
        graph::resolve(scripts)
    }

    /// Run the preflight: load, resolve, and read the manifest.
    pub async fn prepare(&self) -> MigrateResult<PreparedRun> {
        let plan = self.plan().await?;
        let manifest = ExpectedSchemaManifest::load(&self.config.manifest_path).await?;
        info!(
            scripts = plan.len(),
            tables = manifest.len(),
            "Prepared migration plan"
        );
        Ok(PreparedRun { plan, manifest })
    }

    /// Prepare and run against an open session.
    pub async fn run<D>(&self, db: &mut D) -> RunReport
    where
        D: MigrationDatabase + ?Sized,
    {
        match self.prepare().await {
            Ok(prepared) => self.run_prepared(&prepared, db).await,
            Err(err) => RunReport::from_error(&err, self.config.dry_run),
        }
    }

    /// Run a prepared plan against an open session.
    ///
    /// Never panics and never returns early: every outcome, including lock
    /// contention, is folded into the report.
    pub async fn run_prepared<D>(&self, prepared: &PreparedRun, db: &mut D) -> RunReport
    where
        D: MigrationDatabase + ?Sized,
    {
        let mut ctx = RunContext::new(prepared, self.config.dry_run);
        let outcome = self.execute(prepared, db, &mut ctx).await;
        if let Err(err) = &outcome {
            warn!(kind = ?err.kind(), "Migration run failed: {}", err);
        }
        let report = ctx.finish(outcome);
        info!("{}", report.summary());
        report
    }

    async fn execute<D>(
        &self,
        prepared: &PreparedRun,
        db: &mut D,
        ctx: &mut RunContext,
    ) -> MigrateResult<()>
    where
        D: MigrationDatabase + ?Sized,
    {
        self.acquire_lock(db, ctx).await?;

        let outcome = self.run_locked(prepared, db, ctx).await;

        if let Err(err) = db.unlock(self.config.lock_key).await {
            ctx.warn(format!(
                "failed to release advisory lock {}: {} (released when the session closes)",
                self.config.lock_key, err
            ));
        } else {
            debug!(key = self.config.lock_key, "Released migration lock");
        }

        outcome
    }

    async fn acquire_lock<D>(&self, db: &mut D, ctx: &mut RunContext) -> MigrateResult<()>
    where
        D: MigrationDatabase + ?Sized,
    {
        let key = self.config.lock_key;
        if db.try_lock(key).await? {
            debug!(key, "Acquired migration lock");
            return Ok(());
        }

        match self.config.lock_mode {
            LockMode::FailFast => Err(MigrationError::LockContention(key)),
            LockMode::Wait {
                poll_interval,
                timeout,
            } => {
                ctx.waited_for_lock = true;
                info!(key, "Another migrator is running; waiting for the lock");
                let started = Instant::now();
                loop {
                    if started.elapsed() >= timeout {
                        return Err(MigrationError::LockTimeout {
                            key,
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(poll_interval).await;
                    if db.try_lock(key).await? {
                        info!(
                            key,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Acquired migration lock after waiting"
                        );
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run_locked<D>(
        &self,
        prepared: &PreparedRun,
        db: &mut D,
        ctx: &mut RunContext,
    ) -> MigrateResult<()>
    where
        D: MigrationDatabase + ?Sized,
    {
        let manifest = &prepared.manifest;

        db.ensure_ledger().await?;
        let records: BTreeMap<String, ExecutionRecord> = db
            .records()
            .await?
            .into_iter()
            .map(|r| (r.filename.clone(), r))
            .collect();

        let pre = validate::validate(manifest, &db.snapshot(&manifest.schema).await?);
        let distrusted = self.distrusted(&prepared.plan.scripts, &records, &pre, ctx);

        for script in &prepared.plan.scripts {
            let record = records.get(&script.filename);
            let trusted = record.is_some_and(|r| r.is_completed_with(&script.checksum))
                && !distrusted.contains(script.filename.as_str());

            if trusted {
                debug!(script = %script.filename, "Already completed; skipping");
                ctx.skipped.push(script.filename.clone());
                continue;
            }

            let reason = match record {
                None => "new",
                Some(r) if r.status == RecordStatus::Completed && r.checksum != script.checksum => {
                    "checksum changed"
                }
                Some(r) if r.status == RecordStatus::Completed => "schema drift",
                Some(r) if r.status == RecordStatus::Running => "interrupted",
                Some(_) => "previously failed",
            };

            if self.config.dry_run {
                info!(script = %script.filename, reason, "[DRY RUN] Would execute");
                ctx.executed.push(script.filename.clone());
                continue;
            }

            self.apply_script(script, reason, db, ctx).await?;
        }

        if self.config.dry_run {
            ctx.tables_verified = pre.tables_verified;
            ctx.schema_valid = pre.is_valid;
            return Ok(());
        }

        let post = validate::validate(manifest, &db.snapshot(&manifest.schema).await?);
        ctx.tables_verified = post.tables_verified;
        ctx.schema_valid = post.is_valid;
        if !post.extra_tables.is_empty() {
            debug!(tables = ?post.extra_tables, "Tables not in the manifest");
        }

        if !post.is_valid {
            let summary = post.summary();
            self.demote(db, ctx, &summary).await;
            return Err(MigrationError::SchemaInvalid(summary));
        }
        info!(tables = post.tables_verified, "Schema matches the manifest");

        if let (Some(seeds), false) = (&self.seeds, self.config.skip_seed) {
            let report = SeedVerifier::new(seeds.clone(), &manifest.schema)
                .run(db)
                .await?;
            ctx.warnings.extend(report.warnings.iter().cloned());
            ctx.seed = Some(report);
        }

        Ok(())
    }

    async fn apply_script<D>(
        &self,
        script: &MigrationScript,
        reason: &str,
        db: &mut D,
        ctx: &mut RunContext,
    ) -> MigrateResult<()>
    where
        D: MigrationDatabase + ?Sized,
    {
        info!(script = %script.filename, reason, "Executing migration");
        db.mark_running(script).await?;

        match db.apply(script).await {
            Ok(elapsed_ms) => {
                info!(script = %script.filename, elapsed_ms, "Migration completed");
                ctx.executed.push(script.filename.clone());
                ctx.completed_this_run
                    .push((script.filename.clone(), script.checksum.clone()));
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(mark_err) = db
                    .mark_failed(&script.filename, &script.checksum, &message)
                    .await
                {
                    ctx.warn(format!(
                        "could not record failure of {}: {}",
                        script.filename, mark_err
                    ));
                }
                Err(err)
            }
        }
    }

    /// Completed scripts that must run again because of drift.
    ///
    /// Objects missing before the run only count as drift when no pending
    /// script (new, changed, failed or interrupted) is going to create them.
    fn distrusted<'a>(
        &self,
        scripts: &'a [MigrationScript],
        records: &BTreeMap<String, ExecutionRecord>,
        pre: &ValidationResult,
        ctx: &mut RunContext,
    ) -> BTreeSet<&'a str> {
        if pre.is_valid {
            return BTreeSet::new();
        }

        let (completed, pending): (Vec<&MigrationScript>, Vec<&MigrationScript>) =
            scripts.iter().partition(|s| {
                records
                    .get(&s.filename)
                    .is_some_and(|r| r.is_completed_with(&s.checksum))
            });

        let drift: Vec<SchemaObject> = pre
            .missing_objects()
            .into_iter()
            .filter(|m| !pending.iter().any(|s| creates(s, m)))
            .collect();
        if drift.is_empty() {
            debug!(
                missing = %pre.summary(),
                "Missing objects are created by pending scripts"
            );
            return BTreeSet::new();
        }

        let described = drift
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        let distrusted: BTreeSet<&str> = match self.config.strictness {
            Strictness::TrustLedger => {
                ctx.warn(format!(
                    "schema drift detected before execution ({}); ledger trusted",
                    described
                ));
                return BTreeSet::new();
            }
            Strictness::RevalidateAll => completed.iter().map(|&s| s.filename.as_str()).collect(),
            Strictness::RevalidateAffected => completed
                .iter()
                .filter(|s| drift.iter().any(|m| creates(s, m)))
                .map(|&s| s.filename.as_str())
                .collect(),
        };

        if !distrusted.is_empty() {
            ctx.warn(format!(
                "schema drift detected before execution ({}); re-executing {} completed script(s)",
                described,
                distrusted.len()
            ));
        }
        distrusted
    }

    /// Mark every record completed in this run as failed.
    async fn demote<D>(&self, db: &mut D, ctx: &mut RunContext, summary: &str)
    where
        D: MigrationDatabase + ?Sized,
    {
        let message = format!("schema validation failed after run: {}", summary);
        let completed = std::mem::take(&mut ctx.completed_this_run);
        for (filename, checksum) in completed {
            if let Err(err) = db.mark_failed(&filename, &checksum, &message).await {
                ctx.warn(format!("could not demote {}: {}", filename, err));
            }
        }
    }

    /// Compare the ledger with the scripts.
    pub async fn status<D>(&self, plan: &ResolvedPlan, db: &mut D) -> MigrateResult<MigrationStatus>
    where
        D: ExecutionLedger + ?Sized,
    {
        let mut records: BTreeMap<String, ExecutionRecord> = db
            .records()
            .await?
            .into_iter()
            .map(|r| (r.filename.clone(), r))
            .collect();

        let mut status = MigrationStatus::default();
        for script in &plan.scripts {
            let record = records.remove(&script.filename);
            let state = match &record {
                None => ScriptState::Pending,
                Some(r) => match r.status {
                    RecordStatus::Completed if r.checksum == script.checksum => ScriptState::Applied,
                    RecordStatus::Completed => ScriptState::Changed,
                    RecordStatus::Failed => ScriptState::Failed,
                    RecordStatus::Running => ScriptState::Interrupted,
                },
            };
            status.entries.push(StatusEntry {
                filename: script.filename.clone(),
                state,
                record,
            });
        }

        for (filename, record) in records {
            status.entries.push(StatusEntry {
                filename,
                state: ScriptState::Orphaned,
                record: Some(record),
            });
        }

        Ok(status)
    }

    /// Validate the live schema against a manifest.
    pub async fn validate<D>(
        &self,
        manifest: &ExpectedSchemaManifest,
        db: &mut D,
    ) -> MigrateResult<ValidationResult>
    where
        D: SchemaCatalog + ?Sized,
    {
        let snapshot = db.snapshot(&manifest.schema).await?;
        Ok(validate::validate(manifest, &snapshot))
    }

    /// Validate the schema, then seed.
    pub async fn seed<D>(&self, manifest: &ExpectedSchemaManifest, db: &mut D) -> MigrateResult<SeedReport>
    where
        D: SchemaCatalog + SeedTarget + ?Sized,
    {
        let Some(seeds) = &self.seeds else {
            return Ok(SeedReport::default());
        };

        let result = self.validate(manifest, db).await?;
        if !result.is_valid {
            return Err(MigrationError::SchemaInvalid(result.summary()));
        }

        SeedVerifier::new(seeds.clone(), &manifest.schema)
            .run(db)
            .await
    }
}

/// Whether a script creates an object, counting a table creator as the
/// owner of its columns.
fn creates(script: &MigrationScript, object: &SchemaObject) -> bool {
    script.creates.contains(object)
        || (matches!(object, SchemaObject::Column { .. })
            && script
                .creates
                .contains(&SchemaObject::table(object.table_name())))
}
