//! `keel plan` command - show the resolved execution order.

use serde::Serialize;

use keel_migrate::ResolvedPlan;

use crate::cli::PlanArgs;
use crate::commands::{Project, print_paths};
use crate::error::CliResult;
use crate::output;

/// One script in the printed plan.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanEntry<'a> {
    filename: &'a str,
    checksum: &'a str,
    dependencies: Vec<&'a str>,
    creates: Vec<String>,
    references: Vec<String>,
    idempotent: bool,
}

#[derive(Debug, Serialize)]
struct PlanView<'a> {
    order: Vec<PlanEntry<'a>>,
    warnings: &'a [String],
}

impl<'a> From<&'a ResolvedPlan> for PlanView<'a> {
    fn from(plan: &'a ResolvedPlan) -> Self {
        let order = plan
            .scripts
            .iter()
            .map(|script| PlanEntry {
                filename: &script.filename,
                checksum: &script.checksum,
                dependencies: script.dependencies.iter().map(String::as_str).collect(),
                creates: script.creates.iter().map(ToString::to_string).collect(),
                references: script.references.iter().map(ToString::to_string).collect(),
                idempotent: script.idempotent,
            })
            .collect();
        Self {
            order,
            warnings: &plan.warnings,
        }
    }
}

/// Run the plan command
pub async fn run(project: &Project, args: PlanArgs) -> CliResult<()> {
    let plan = project.engine().plan().await?;

    if args.json {
        return output::json(&PlanView::from(&plan));
    }

    output::header("Migration Plan");
    print_paths(project);

    if plan.is_empty() {
        output::info("No migration scripts found.");
        return Ok(());
    }

    output::section("Execution order");
    for (i, script) in plan.scripts.iter().enumerate() {
        let mut line = script.filename.clone();
        if !script.dependencies.is_empty() {
            let deps: Vec<&str> = script.dependencies.iter().map(String::as_str).collect();
            line.push_str(&format!(" (after {})", deps.join(", ")));
        }
        output::numbered_item(i + 1, &line);
    }
    output::newline();

    for warning in &plan.warnings {
        output::warn(warning);
    }
    if !plan.warnings.is_empty() {
        output::newline();
    }

    output::success(&format!("{} scripts resolved", plan.len()));
    Ok(())
}
