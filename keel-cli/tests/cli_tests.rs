//! Integration tests for the Keel CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get the keel binary
#[allow(deprecated)]
fn keel_cmd() -> Command {
    let mut cmd = Command::cargo_bin("keel").unwrap();
    cmd.env_remove("DATABASE_URL").env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// A project with the three-script users/projects layout.
fn project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let migrations = temp_dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();

    write(
        &migrations,
        "0001_create_users.sql",
        "CREATE TABLE users (id SERIAL PRIMARY KEY, email TEXT NOT NULL);",
    );
    write(
        &migrations,
        "0002_create_projects.sql",
        "CREATE TABLE projects (id SERIAL PRIMARY KEY, owner_id INTEGER REFERENCES users(id), name TEXT);",
    );
    write(
        &migrations,
        "0003_index_projects.sql",
        "CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);",
    );
    write(
        &migrations,
        "schema.toml",
        r#"schema = "public"

[tables]
users = ["id", "email"]
projects = ["id", "owner_id", "name"]
"#,
    );
    temp_dir
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_help_command() {
    keel_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dependency-aware schema migrations"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("rehearse"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("seed"));
}

#[test]
fn test_version_command() {
    keel_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("Version"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_migrate_help() {
    keel_cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--wait"))
        .stdout(predicate::str::contains("--strictness"))
        .stdout(predicate::str::contains("--skip-seed"));
}

#[test]
fn test_plan_orders_scripts() {
    let temp_dir = project();

    let output = keel_cmd()
        .current_dir(temp_dir.path())
        .args(["plan", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan = stdout_json(&output);
    let order: Vec<&str> = plan["order"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["filename"].as_str().unwrap())
        .collect();
    assert_eq!(
        order,
        vec![
            "0001_create_users.sql",
            "0002_create_projects.sql",
            "0003_index_projects.sql"
        ]
    );
    assert_eq!(
        plan["order"][1]["dependencies"],
        serde_json::json!(["0001_create_users.sql"])
    );
}

#[test]
fn test_plan_rejects_cycles() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "0001_a.sql",
        "CREATE TABLE a (id INT); ALTER TABLE b ADD COLUMN a_id INT REFERENCES a(id);",
    );
    write(
        temp_dir.path(),
        "0002_b.sql",
        "CREATE TABLE b (id INT); ALTER TABLE a ADD COLUMN b_id INT REFERENCES b(id);",
    );

    keel_cmd()
        .current_dir(temp_dir.path())
        .args(["--dir", ".", "plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Circular dependency"));
}

#[test]
fn test_manifest_prints_draft() {
    let temp_dir = project();

    keel_cmd()
        .current_dir(temp_dir.path())
        .arg("manifest")
        .assert()
        .success()
        .stdout(predicate::str::contains("[tables]"))
        .stdout(predicate::str::contains("users"))
        .stdout(predicate::str::contains("owner_id"));
}

#[test]
fn test_manifest_refuses_to_overwrite() {
    let temp_dir = project();

    keel_cmd()
        .current_dir(temp_dir.path())
        .args(["manifest", "--output", "migrations/schema.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_rehearse_applies_every_script() {
    let temp_dir = project();

    let output = keel_cmd()
        .current_dir(temp_dir.path())
        .args(["rehearse", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["success"], true);
    assert_eq!(report["migrationsRun"], 3);
    assert_eq!(report["migrationsSkipped"], 0);
    assert_eq!(report["schemaValid"], true);
    assert_eq!(report["tablesVerified"], 2);
}

#[test]
fn test_rehearse_fails_on_manifest_mismatch() {
    let temp_dir = project();
    write(
        &temp_dir.path().join("migrations"),
        "schema.toml",
        "[tables]\nusers = [\"id\", \"email\"]\naudit_log = [\"id\"]\n",
    );

    let output = keel_cmd()
        .current_dir(temp_dir.path())
        .args(["rehearse", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["success"], false);
    assert_eq!(report["schemaValid"], false);
    assert_eq!(report["failure"], "post_condition");
}

#[test]
fn test_migrate_without_database_url_fails() {
    let temp_dir = project();

    let output = keel_cmd()
        .current_dir(temp_dir.path())
        .args(["migrate", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["success"], false);
    assert_eq!(report["failure"], "preflight");
    assert!(
        report["errors"][0]
            .as_str()
            .unwrap()
            .contains("Database URL not found")
    );
}

#[test]
fn test_migrate_missing_directory_fails_before_connecting() {
    let temp_dir = TempDir::new().unwrap();

    keel_cmd()
        .current_dir(temp_dir.path())
        .args(["migrate", "--dir", "does-not-exist"])
        .env("DATABASE_URL", "postgresql://localhost:1/never")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Migrations directory not found"));
}

#[test]
fn test_status_without_database_url_fails() {
    let temp_dir = project();

    keel_cmd()
        .current_dir(temp_dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_invalid_config_file_fails() {
    let temp_dir = project();
    write(temp_dir.path(), "keel.toml", "[migrations\ndirectory = 1");

    keel_cmd()
        .current_dir(temp_dir.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
