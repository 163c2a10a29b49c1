//! `keel seed` command - insert baseline rows that are missing.

use crate::cli::SeedArgs;
use crate::commands::{Project, print_paths};
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the seed command
pub async fn run(project: &Project, args: SeedArgs) -> CliResult<()> {
    let seeds = project
        .seeds(args.seed_file.as_deref())
        .await?
        .ok_or_else(|| {
            CliError::Config(
                "No seed file found. Set [seed] file in keel.toml or pass --seed-file".to_string(),
            )
        })?;
    let manifest = project.manifest().await?;

    let mut db = project.connect().await?;
    let report = project
        .engine()
        .with_seeds(seeds)
        .seed(&manifest, &mut db)
        .await?;

    if args.json {
        return output::json(&report);
    }

    output::header("Seed");
    print_paths(project);

    for dataset in &report.datasets {
        let line = if dataset.table_missing {
            output::style_pending(&format!("{}: table missing, skipped", dataset.table))
        } else {
            format!(
                "{}: {} inserted, {} already present",
                dataset.table, dataset.inserted, dataset.skipped
            )
        };
        output::list_item(&line);
    }
    output::newline();

    for warning in &report.warnings {
        output::warn(warning);
    }

    output::success(&format!(
        "Seeded {} rows ({} already present)",
        report.inserted(),
        report.skipped()
    ));
    Ok(())
}
