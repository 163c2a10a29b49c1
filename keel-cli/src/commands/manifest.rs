//! `keel manifest` command - draft a manifest from the scripts.

use keel_migrate::ExpectedSchemaManifest;

use crate::cli::ManifestArgs;
use crate::commands::Project;
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the manifest command
pub async fn run(project: &Project, args: ManifestArgs) -> CliResult<()> {
    let plan = project.engine().plan().await?;
    let draft = ExpectedSchemaManifest::draft_from_scripts(&plan.scripts);
    let content = draft.to_toml()?;

    let Some(path) = args.output else {
        print!("{}", content);
        return Ok(());
    };

    if path.exists() && !args.force {
        return Err(CliError::Command(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    std::fs::write(&path, &content)?;
    output::success(&format!(
        "Wrote draft manifest with {} tables to {}",
        draft.len(),
        path.display()
    ));
    output::dim("Review it: the draft only knows what the scripts create.");
    Ok(())
}
