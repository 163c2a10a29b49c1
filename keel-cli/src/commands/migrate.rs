//! `keel migrate` command - apply pending migrations.

use std::time::Duration;

use keel_migrate::{FailureKind, LockMode, MigrationEngine, RunReport};

use crate::cli::MigrateArgs;
use crate::commands::{Project, print_paths};
use crate::error::{CliError, CliResult};
use crate::output::{self, success};

/// Run the migrate command
pub async fn run(project: &Project, args: MigrateArgs) -> CliResult<()> {
    let mut config = project
        .engine_config()
        .dry_run(args.dry_run)
        .skip_seed(args.skip_seed || !project.config.seed.auto_seed);
    if args.wait {
        config = config.lock_mode(LockMode::wait(Duration::from_secs(args.wait_timeout)));
    }
    if let Some(strictness) = args.strictness {
        config = config.strictness(strictness.into());
    }

    let mut engine = MigrationEngine::new(config);
    if !args.json {
        output::header(if args.dry_run {
            "Migrate (dry run)"
        } else {
            "Migrate"
        });
        print_paths(project);
        output::kv("Strictness", engine.config().strictness.as_str());
        output::newline();
    }

    // Everything that can fail without a database fails here.
    let prepared = match engine.prepare().await {
        Ok(prepared) => prepared,
        Err(err) => return finish(&RunReport::from_error(&err, args.dry_run), args.json),
    };
    match project.seeds(None).await {
        Ok(Some(seeds)) => engine = engine.with_seeds(seeds),
        Ok(None) => {}
        Err(err) => return finish(&RunReport::from_error(&err, args.dry_run), args.json),
    }

    let mut db = match project.connect().await {
        Ok(db) => db,
        Err(err) => return finish(&RunReport::from_error(&err, args.dry_run), args.json),
    };

    let report = engine.run_prepared(&prepared, &mut db).await;
    finish(&report, args.json)
}

/// Print a run report and turn a failed run into an error.
pub(crate) fn finish(report: &RunReport, json: bool) -> CliResult<()> {
    if json {
        output::json(report)?;
    } else {
        print_report(report);
    }

    if report.success {
        Ok(())
    } else {
        Err(report_error(report))
    }
}

fn print_report(report: &RunReport) {
    if !report.executed.is_empty() {
        output::section(if report.dry_run {
            "Would run"
        } else {
            "Executed"
        });
        for filename in &report.executed {
            output::list_item(&output::style_success(filename));
        }
        output::newline();
    }

    if !report.skipped.is_empty() {
        output::section("Already applied");
        for filename in &report.skipped {
            output::list_item(filename);
        }
        output::newline();
    }

    for warning in &report.warnings {
        output::warn(warning);
    }
    if !report.warnings.is_empty() {
        output::newline();
    }

    output::kv("Run", &report.migrations_run.to_string());
    output::kv("Skipped", &report.migrations_skipped.to_string());
    output::kv("Total", &report.total_migrations.to_string());
    output::kv("Tables verified", &report.tables_verified.to_string());
    output::kv(
        "Schema",
        &if report.schema_valid {
            output::style_success("valid")
        } else {
            output::style_error("invalid")
        },
    );
    if let Some(seed) = &report.seed {
        output::kv(
            "Seed",
            &format!("{} inserted, {} present", seed.inserted(), seed.skipped()),
        );
    }
    if report.waited_for_lock {
        output::kv("Lock", "waited for another migrator");
    }
    output::kv("Duration", &format!("{}ms", report.duration_ms));
    output::newline();

    if report.success {
        success(&report.summary());
    }
}

fn report_error(report: &RunReport) -> CliError {
    let message = report.errors.join("; ");
    match report.failure {
        Some(FailureKind::Preflight) => CliError::Preflight(message),
        Some(FailureKind::LockContention) => CliError::Lock(message),
        Some(FailureKind::PostCondition) => CliError::Validation(message),
        Some(FailureKind::Database) => CliError::Database(message),
        Some(FailureKind::Seed) => CliError::Seed(message),
        Some(FailureKind::Graph) | Some(FailureKind::Execution) | None => {
            CliError::Migration(message)
        }
    }
}
