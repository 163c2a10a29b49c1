//! End-to-end runs of the migration engine against the in-memory database.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keel::migrate::{
    DEFAULT_LOCK_KEY, ExecutionLedger, ExecutionRecord, FailureKind, LockMode, MemoryDatabase,
    MigrationConfig, MigrationEngine, RecordStatus, ScriptState, SeedFile, Strictness,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const USERS: &str = "0001_create_users.sql";
const PROJECTS: &str = "0002_create_projects.sql";
const INDEX: &str = "0003_index_projects.sql";

const MANIFEST: &str = r#"schema = "public"

[tables]
users = ["id", "email"]
projects = ["id", "owner_id", "name"]
"#;

/// A migrations directory with a manifest next to the scripts.
struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let project = Self { dir };
        project.write("schema.toml", MANIFEST);
        project
    }

    /// The users/projects layout with plain CREATE TABLE statements.
    fn standard() -> Self {
        let project = Self::new();
        project.write(
            USERS,
            "CREATE TABLE users (id SERIAL PRIMARY KEY, email TEXT NOT NULL);",
        );
        project.write(
            PROJECTS,
            "CREATE TABLE projects (id SERIAL PRIMARY KEY, owner_id INTEGER REFERENCES users(id), name TEXT);",
        );
        project.write(
            INDEX,
            "CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);",
        );
        project
    }

    /// The same layout, written so every script can safely run twice.
    fn idempotent() -> Self {
        let project = Self::new();
        project.write(
            USERS,
            "CREATE TABLE IF NOT EXISTS users (id SERIAL PRIMARY KEY, email TEXT NOT NULL);",
        );
        project.write(
            PROJECTS,
            "CREATE TABLE IF NOT EXISTS projects (id SERIAL PRIMARY KEY, owner_id INTEGER REFERENCES users(id), name TEXT);",
        );
        project.write(
            INDEX,
            "CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);",
        );
        project
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.path().join(name), content).expect("Failed to write file");
    }

    fn manifest_path(&self) -> PathBuf {
        self.path().join("schema.toml")
    }

    fn config(&self) -> MigrationConfig {
        MigrationConfig::new()
            .migrations_dir(self.path())
            .manifest_path(self.manifest_path())
    }

    fn engine(&self) -> MigrationEngine {
        MigrationEngine::new(self.config())
    }
}

fn status_of(db: &MemoryDatabase, filename: &str) -> Option<RecordStatus> {
    db.record(filename).map(|r| r.status)
}

/// Applies every script of a fresh project in dependency order.
#[tokio::test]
async fn test_fresh_database_runs_every_script() {
    let project = Project::standard();
    let db = MemoryDatabase::new();

    let report = project.engine().run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![USERS, PROJECTS, INDEX]);
    assert_eq!(report.migrations_run, 3);
    assert_eq!(report.migrations_skipped, 0);
    assert_eq!(report.total_migrations, 3);
    assert_eq!(report.tables_verified, 2);
    assert!(report.schema_valid);
    assert!(report.failure.is_none());
    assert!(!report.waited_for_lock);

    assert!(db.has_table("users"));
    let mut columns = db.columns("projects");
    columns.sort();
    assert_eq!(columns, vec!["id", "name", "owner_id"]);
    for filename in [USERS, PROJECTS, INDEX] {
        assert_eq!(status_of(&db, filename), Some(RecordStatus::Completed));
    }
    assert_eq!(db.lock_holder(DEFAULT_LOCK_KEY), None);
}

/// A second run against an up-to-date database changes nothing.
#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let engine = project.engine();

    assert!(engine.run(&mut db.connect()).await.success);
    let ledger = db.ledger();

    let report = engine.run(&mut db.connect()).await;
    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.migrations_run, 0);
    assert_eq!(report.skipped, vec![USERS, PROJECTS, INDEX]);
    assert!(report.schema_valid);
    assert_eq!(db.ledger(), ledger);
}

/// Dependencies decide the order, not filenames.
#[tokio::test]
async fn test_dependencies_override_filename_order() {
    let project = Project::new();
    project.write(
        "0001_index_projects.sql",
        "CREATE INDEX idx_projects_owner ON projects(owner_id);",
    );
    project.write(
        "0002_create_projects.sql",
        "CREATE TABLE projects (id SERIAL PRIMARY KEY, owner_id INTEGER REFERENCES users(id), name TEXT);",
    );
    project.write(
        "0003_create_users.sql",
        "CREATE TABLE users (id SERIAL PRIMARY KEY, email TEXT NOT NULL);",
    );
    let db = MemoryDatabase::new();

    let report = project.engine().run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(
        report.executed,
        vec![
            "0003_create_users.sql",
            "0002_create_projects.sql",
            "0001_index_projects.sql"
        ]
    );
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("only created by later script"))
    );
}

/// A cycle fails the run before the database is touched.
#[tokio::test]
async fn test_cycle_fails_before_touching_the_database() {
    let project = Project::new();
    project.write(
        "0001_a.sql",
        "CREATE TABLE a (id INT); ALTER TABLE b ADD COLUMN a_id INT REFERENCES a(id);",
    );
    project.write(
        "0002_b.sql",
        "CREATE TABLE b (id INT); ALTER TABLE a ADD COLUMN b_id INT REFERENCES b(id);",
    );
    let db = MemoryDatabase::new();

    let report = project.engine().run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Graph));
    assert!(report.errors[0].contains("Circular dependency"));
    assert!(db.ledger().is_empty());
    assert!(!db.has_table("a"));
}

/// A missing manifest is a preflight failure.
#[tokio::test]
async fn test_missing_manifest_is_a_preflight_failure() {
    let project = Project::standard();
    fs::remove_file(project.manifest_path()).expect("Failed to remove manifest");
    let db = MemoryDatabase::new();

    let report = project.engine().run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Preflight));
    assert!(db.ledger().is_empty());
}

/// A release that adds a script and extends the manifest runs only the new script.
#[tokio::test]
async fn test_incremental_release_runs_only_new_script() {
    let project = Project::new();
    project.write("schema.toml", "[tables]\nusers = [\"id\", \"email\"]\n");
    project.write(
        USERS,
        "CREATE TABLE users (id SERIAL PRIMARY KEY, email TEXT NOT NULL);",
    );
    let db = MemoryDatabase::new();
    let engine = project.engine();
    assert!(engine.run(&mut db.connect()).await.success);

    project.write("schema.toml", MANIFEST);
    project.write(
        PROJECTS,
        "CREATE TABLE projects (id SERIAL PRIMARY KEY, owner_id INTEGER REFERENCES users(id), name TEXT);",
    );

    let report = engine.run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![PROJECTS]);
    assert_eq!(report.skipped, vec![USERS]);
    assert!(report.schema_valid);
    assert!(!report.warnings.iter().any(|w| w.contains("schema drift")));
    assert_eq!(status_of(&db, USERS), Some(RecordStatus::Completed));
    assert_eq!(status_of(&db, PROJECTS), Some(RecordStatus::Completed));
}

/// Pending scripts cover only their own objects; other missing objects are still drift.
#[tokio::test]
async fn test_drift_alongside_new_script() {
    let project = Project::new();
    project.write("schema.toml", "[tables]\nusers = [\"id\", \"email\"]\n");
    project.write(
        USERS,
        "CREATE TABLE users (id SERIAL PRIMARY KEY, email TEXT NOT NULL);",
    );
    let db = MemoryDatabase::new();
    let engine = project.engine();
    assert!(engine.run(&mut db.connect()).await.success);

    assert!(db.drop_table("users"));
    project.write("schema.toml", MANIFEST);
    project.write(
        PROJECTS,
        "CREATE TABLE projects (id SERIAL PRIMARY KEY, owner_id INTEGER REFERENCES users(id), name TEXT);",
    );

    let report = engine.run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![USERS, PROJECTS]);
    let drift = report
        .warnings
        .iter()
        .find(|w| w.contains("schema drift"))
        .expect("drift warning");
    assert!(drift.contains("users"));
    assert!(!drift.contains("projects"));
}

/// Editing an applied script re-runs only that script.
#[tokio::test]
async fn test_checksum_change_replays_the_script() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let engine = project.engine();
    assert!(engine.run(&mut db.connect()).await.success);

    project.write(
        INDEX,
        "CREATE INDEX IF NOT EXISTS idx_projects_owner_name ON projects(owner_id, name);",
    );
    let plan = engine.plan().await.expect("Failed to plan");
    let status = engine
        .status(&plan, &mut db.connect())
        .await
        .expect("Failed to read status");
    assert_eq!(status.entries[2].state, ScriptState::Changed);

    let report = engine.run(&mut db.connect()).await;
    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![INDEX]);
    assert_eq!(report.skipped, vec![USERS, PROJECTS]);

    let record = db.record(INDEX).expect("record");
    assert_eq!(record.checksum, plan.get(INDEX).expect("script").checksum);
}

/// Under RevalidateAffected only the creator of the dropped table runs again.
#[tokio::test]
async fn test_drift_revalidates_affected_scripts() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    assert!(project.engine().run(&mut db.connect()).await.success);

    assert!(db.drop_table("projects"));

    let engine =
        MigrationEngine::new(project.config().strictness(Strictness::RevalidateAffected));
    let report = engine.run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![PROJECTS]);
    assert_eq!(report.skipped, vec![USERS, INDEX]);
    assert!(report.warnings.iter().any(|w| w.contains("schema drift")));
    assert!(db.has_table("projects"));
}

/// Under RevalidateAll every completed script runs again.
#[tokio::test]
async fn test_drift_revalidates_all_scripts() {
    let project = Project::idempotent();
    let db = MemoryDatabase::new();
    assert!(project.engine().run(&mut db.connect()).await.success);

    assert!(db.drop_table("projects"));

    let engine = MigrationEngine::new(project.config().strictness(Strictness::RevalidateAll));
    let report = engine.run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![USERS, PROJECTS, INDEX]);
    assert!(report.skipped.is_empty());
    assert!(report.schema_valid);
}

/// Trusting the ledger skips everything and lets validation catch the drift.
#[tokio::test]
async fn test_drift_with_trusted_ledger_fails_validation() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    assert!(project.engine().run(&mut db.connect()).await.success);

    assert!(db.drop_table("projects"));

    let engine = MigrationEngine::new(project.config().strictness(Strictness::TrustLedger));
    let report = engine.run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::PostCondition));
    assert_eq!(report.migrations_run, 0);
    assert_eq!(report.migrations_skipped, 3);
    assert!(!report.schema_valid);
    assert!(report.warnings.iter().any(|w| w.contains("ledger trusted")));
    // Nothing ran this time, so nothing is demoted.
    assert_eq!(status_of(&db, PROJECTS), Some(RecordStatus::Completed));
}

/// A failing statement leaves no partial changes behind.
#[tokio::test]
async fn test_failed_script_is_rolled_back() {
    let project = Project::new();
    project.write(
        "0001_audit.sql",
        "CREATE TABLE audit (id INT);\nCREATE INDEX idx_missing ON missing_table (id);",
    );
    let db = MemoryDatabase::new();

    let report = project.engine().run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Execution));
    assert!(report.executed.is_empty());
    assert!(!db.has_table("audit"));

    let record = db.record("0001_audit.sql").expect("record");
    assert_eq!(record.status, RecordStatus::Failed);
    assert!(
        record
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("missing_table"))
    );
}

/// A failure halts the run, and the next run resumes at the failed script.
#[tokio::test]
async fn test_failure_halts_and_resumes() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let engine = project.engine();
    db.fail_script(PROJECTS, "syntax error at or near \"PROJECTS\"");

    let report = engine.run(&mut db.connect()).await;
    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Execution));
    assert_eq!(report.executed, vec![USERS]);
    assert!(report.errors[0].contains(PROJECTS));
    assert_eq!(status_of(&db, USERS), Some(RecordStatus::Completed));
    assert_eq!(status_of(&db, PROJECTS), Some(RecordStatus::Failed));
    assert_eq!(status_of(&db, INDEX), None);
    assert!(!db.has_table("projects"));
    assert_eq!(db.lock_holder(DEFAULT_LOCK_KEY), None);

    db.clear_failure(PROJECTS);
    let report = engine.run(&mut db.connect()).await;
    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![PROJECTS, INDEX]);
    assert_eq!(report.skipped, vec![USERS]);
}

/// A script left `running` by a crashed process is executed again.
#[tokio::test]
async fn test_interrupted_script_runs_again() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let engine = project.engine();
    let plan = engine.plan().await.expect("Failed to plan");
    let checksum = &plan.get(USERS).expect("script").checksum;
    db.put_record(ExecutionRecord::new(USERS, checksum, RecordStatus::Running));

    let status = engine
        .status(&plan, &mut db.connect())
        .await
        .expect("Failed to read status");
    assert_eq!(status.entries[0].state, ScriptState::Interrupted);

    let report = engine.run(&mut db.connect()).await;
    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec![USERS, PROJECTS, INDEX]);
    assert_eq!(status_of(&db, USERS), Some(RecordStatus::Completed));
}

/// Status reports every ledger state, orphans last.
#[tokio::test]
async fn test_status_reports_each_state() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let engine = project.engine();
    db.fail_script(PROJECTS, "boom");
    engine.run(&mut db.connect()).await;
    db.put_record(ExecutionRecord::new(
        "0000_legacy.sql",
        "abc123",
        RecordStatus::Completed,
    ));

    let plan = engine.plan().await.expect("Failed to plan");
    let status = engine
        .status(&plan, &mut db.connect())
        .await
        .expect("Failed to read status");

    let states: Vec<(&str, ScriptState)> = status
        .entries
        .iter()
        .map(|e| (e.filename.as_str(), e.state))
        .collect();
    assert_eq!(
        states,
        vec![
            (USERS, ScriptState::Applied),
            (PROJECTS, ScriptState::Failed),
            (INDEX, ScriptState::Pending),
            ("0000_legacy.sql", ScriptState::Orphaned),
        ]
    );
    assert!(status.has_pending());
    assert_eq!(status.count(ScriptState::Orphaned), 1);
}

/// A held lock fails the run immediately without touching the ledger.
#[tokio::test]
async fn test_lock_contention_fails_fast() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let mut holder = db.connect();
    assert!(holder.try_lock(DEFAULT_LOCK_KEY).await.expect("lock"));

    let report = project.engine().run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::LockContention));
    assert_eq!(report.migrations_run, 0);
    assert!(db.ledger().is_empty());
    assert!(!db.has_table("users"));
    assert_eq!(db.lock_holder(DEFAULT_LOCK_KEY), Some(holder.id()));

    drop(holder);
    assert!(project.engine().run(&mut db.connect()).await.success);
}

/// Wait mode picks up the lock once the other migrator is done.
#[tokio::test]
async fn test_wait_mode_acquires_released_lock() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let mut holder = db.connect();
    assert!(holder.try_lock(DEFAULT_LOCK_KEY).await.expect("lock"));

    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(holder);
    });

    let engine = MigrationEngine::new(project.config().lock_mode(LockMode::Wait {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    }));
    let report = engine.run(&mut db.connect()).await;
    release.await.expect("release task");

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.waited_for_lock);
    assert_eq!(report.migrations_run, 3);
}

/// Wait mode gives up after its timeout.
#[tokio::test]
async fn test_wait_mode_times_out() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let mut holder = db.connect();
    assert!(holder.try_lock(DEFAULT_LOCK_KEY).await.expect("lock"));

    let engine = MigrationEngine::new(project.config().lock_mode(LockMode::Wait {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(50),
    }));
    let report = engine.run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::LockContention));
    assert!(report.waited_for_lock);
    assert!(report.errors[0].contains("Timed out"));
    assert!(db.ledger().is_empty());
}

/// Scripts completed in a run that ends with an invalid schema are demoted.
#[tokio::test]
async fn test_invalid_schema_demotes_completed_scripts() {
    let project = Project::standard();
    project.write(
        "schema.toml",
        "[tables]\nusers = [\"id\", \"email\"]\nprojects = [\"id\"]\naudit_log = [\"id\"]\n",
    );
    let db = MemoryDatabase::new();

    let report = project.engine().run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::PostCondition));
    assert_eq!(report.migrations_run, 3);
    assert_eq!(report.tables_verified, 2);
    assert!(!report.schema_valid);
    assert!(report.errors[0].contains("audit_log"));

    for filename in [USERS, PROJECTS, INDEX] {
        let record = db.record(filename).expect("record");
        assert_eq!(record.status, RecordStatus::Failed);
        assert!(
            record
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("schema validation failed after run"))
        );
    }
}

/// A dry run reports what would run and changes nothing.
#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let project = Project::standard();
    let db = MemoryDatabase::new();

    let engine = MigrationEngine::new(project.config().dry_run(true));
    let report = engine.run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.dry_run);
    assert_eq!(report.executed, vec![USERS, PROJECTS, INDEX]);
    assert_eq!(report.migrations_run, 3);
    assert!(!report.schema_valid);
    assert!(!db.has_table("users"));
    assert!(db.ledger().is_empty());
}

/// A dry run against a migrated database lists only new scripts.
#[tokio::test]
async fn test_dry_run_lists_only_new_scripts() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    assert!(project.engine().run(&mut db.connect()).await.success);

    project.write(
        "0004_create_teams.sql",
        "CREATE TABLE teams (id SERIAL PRIMARY KEY);",
    );
    let engine = MigrationEngine::new(project.config().dry_run(true));
    let report = engine.run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.executed, vec!["0004_create_teams.sql"]);
    assert_eq!(report.migrations_skipped, 3);
    assert!(report.schema_valid);
    assert!(!db.has_table("teams"));
    assert!(db.record("0004_create_teams.sql").is_none());
}

const SEEDS: &str = r#"
[[datasets]]
table = "users"
key = ["email"]
required = true
rows = [
    { id = 1, email = "admin@example.com" },
    { id = 2, email = "ops@example.com" },
]

[[datasets]]
table = "feature_flags"
key = ["name"]
rows = [{ name = "beta" }]
"#;

/// Seeding inserts missing rows once and skips them afterwards.
#[tokio::test]
async fn test_seeding_is_idempotent() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let seeds = SeedFile::from_toml(SEEDS).expect("Failed to parse seeds");
    let engine = project.engine().with_seeds(seeds);

    let report = engine.run(&mut db.connect()).await;
    assert!(report.success, "errors: {:?}", report.errors);
    let seed = report.seed.expect("seed report");
    assert_eq!(seed.inserted(), 2);
    assert_eq!(seed.skipped(), 0);
    assert!(seed.datasets[1].table_missing);
    assert!(report.warnings.iter().any(|w| w.contains("feature_flags")));
    assert_eq!(db.rows("users").len(), 2);

    let report = engine.run(&mut db.connect()).await;
    assert!(report.success, "errors: {:?}", report.errors);
    let seed = report.seed.expect("seed report");
    assert_eq!(seed.inserted(), 0);
    assert_eq!(seed.skipped(), 2);
    assert_eq!(db.rows("users").len(), 2);
}

/// A required dataset whose table is missing fails the run.
#[tokio::test]
async fn test_missing_required_seed_table_fails() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let seeds = SeedFile::from_toml(
        "[[datasets]]\ntable = \"roles\"\nkey = [\"name\"]\nrequired = true\nrows = [{ name = \"admin\" }]\n",
    )
    .expect("Failed to parse seeds");

    let report = project.engine().with_seeds(seeds).run(&mut db.connect()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Seed));
    assert!(report.errors[0].contains("roles"));
    // The migrations themselves went through.
    assert_eq!(status_of(&db, USERS), Some(RecordStatus::Completed));
}

/// Seeding can be switched off.
#[tokio::test]
async fn test_skip_seed() {
    let project = Project::standard();
    let db = MemoryDatabase::new();
    let seeds = SeedFile::from_toml(SEEDS).expect("Failed to parse seeds");

    let engine = MigrationEngine::new(project.config().skip_seed(true)).with_seeds(seeds);
    let report = engine.run(&mut db.connect()).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.seed.is_none());
    assert!(db.rows("users").is_empty());
}

/// The report serializes with the field names deployment tooling reads.
#[tokio::test]
async fn test_report_json_shape() {
    let project = Project::standard();
    let db = MemoryDatabase::new();

    let report = project.engine().run(&mut db.connect()).await;
    let json = serde_json::to_value(&report).expect("Failed to serialize report");

    assert_eq!(json["success"], true);
    assert_eq!(json["migrationsRun"], 3);
    assert_eq!(json["migrationsSkipped"], 0);
    assert_eq!(json["tablesVerified"], 2);
    assert_eq!(json["schemaValid"], true);
    assert_eq!(json["errors"], serde_json::json!([]));
}
