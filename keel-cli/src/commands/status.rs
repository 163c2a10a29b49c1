//! `keel status` command - compare the ledger with the migration files.

use keel_migrate::{MigrationStatus, ScriptState};

use crate::cli::StatusArgs;
use crate::commands::{Project, print_paths};
use crate::error::CliResult;
use crate::output;

/// Run the status command
pub async fn run(project: &Project, args: StatusArgs) -> CliResult<()> {
    let engine = project.engine();
    let plan = engine.plan().await?;
    let mut db = project.connect().await?;
    let status = engine.status(&plan, &mut db).await?;

    if args.json {
        return output::json(&status);
    }

    output::header("Migration Status");
    print_paths(project);

    if status.entries.is_empty() {
        output::info("No migrations found.");
        return Ok(());
    }

    output::section("Migrations");
    for (i, entry) in status.entries.iter().enumerate() {
        output::numbered_item(i + 1, &format!("{} - {}", entry.filename, styled(entry.state)));
        if let Some(message) = entry.record.as_ref().and_then(|r| r.error_message.as_deref()) {
            output::dim(&format!("       {}", message));
        }
    }
    output::newline();

    print_counts(&status);
    Ok(())
}

fn styled(state: ScriptState) -> String {
    match state {
        ScriptState::Applied => output::style_success("✓ Applied"),
        ScriptState::Pending => output::style_pending("○ Pending"),
        ScriptState::Changed => output::style_pending("△ Changed since applied"),
        ScriptState::Interrupted => output::style_pending("◌ Interrupted"),
        ScriptState::Failed => output::style_error("✗ Failed"),
        ScriptState::Orphaned => output::style_error("? No matching file"),
    }
}

fn print_counts(status: &MigrationStatus) {
    output::kv("Total", &status.entries.len().to_string());
    output::kv("Applied", &status.count(ScriptState::Applied).to_string());
    output::kv("Pending", &status.count(ScriptState::Pending).to_string());
    for (label, state) in [
        ("Changed", ScriptState::Changed),
        ("Interrupted", ScriptState::Interrupted),
        ("Failed", ScriptState::Failed),
        ("Orphaned", ScriptState::Orphaned),
    ] {
        let count = status.count(state);
        if count > 0 {
            output::kv(label, &count.to_string());
        }
    }
    output::newline();

    if status.has_pending() {
        output::info("Run `keel migrate` to apply pending scripts.");
    } else {
        output::success("Database is up to date");
    }
}
