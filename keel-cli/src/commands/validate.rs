//! `keel validate` command - compare the live schema with the manifest.

use crate::cli::ValidateArgs;
use crate::commands::{Project, print_paths};
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the validate command
pub async fn run(project: &Project, args: ValidateArgs) -> CliResult<()> {
    let manifest = project.manifest().await?;
    let mut db = project.connect().await?;
    let result = project.engine().validate(&manifest, &mut db).await?;

    if args.json {
        output::json(&result)?;
    } else {
        output::header("Validate Schema");
        print_paths(project);
        output::kv("Schema", &manifest.schema);
        output::kv("Tables expected", &manifest.len().to_string());
        output::kv("Tables verified", &result.tables_verified.to_string());
        output::newline();

        for table in &result.missing_tables {
            output::list_item(&output::style_error(&format!("missing table {}", table)));
        }
        for column in &result.missing_columns {
            output::list_item(&output::style_error(&format!(
                "missing column {}.{}",
                column.table, column.column
            )));
        }
        if !result.extra_tables.is_empty() {
            output::dim(&format!(
                "Not in manifest: {}",
                result.extra_tables.join(", ")
            ));
        }
        output::newline();
    }

    if result.is_valid {
        if !args.json {
            output::success(&format!("Schema is valid ({})", result.summary()));
        }
        Ok(())
    } else {
        Err(CliError::Validation(result.summary()))
    }
}
