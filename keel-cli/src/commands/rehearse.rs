//! `keel rehearse` command - run every script against an in-memory database.

use keel_migrate::{MemoryDatabase, RunReport};

use crate::cli::RehearseArgs;
use crate::commands::migrate::finish;
use crate::commands::{Project, print_paths};
use crate::error::CliResult;
use crate::output;

/// Run the rehearse command
///
/// The in-memory database starts empty, so every script runs in plan order
/// and the result is checked against the manifest, without a live server.
pub async fn run(project: &Project, args: RehearseArgs) -> CliResult<()> {
    let mut engine = project.engine();

    if !args.json {
        output::header("Rehearse");
        print_paths(project);
    }

    let prepared = match engine.prepare().await {
        Ok(prepared) => prepared,
        Err(err) => return finish(&RunReport::from_error(&err, false), args.json),
    };
    match project.seeds(None).await {
        Ok(Some(seeds)) => engine = engine.with_seeds(seeds),
        Ok(None) => {}
        Err(err) => return finish(&RunReport::from_error(&err, false), args.json),
    }

    let database = MemoryDatabase::new().with_schema(&prepared.manifest.schema);
    let mut session = database.connect();
    let report = engine.run_prepared(&prepared, &mut session).await;

    if !args.json && report.success {
        output::dim("Rehearsed against an empty in-memory database; nothing was written.");
        output::newline();
    }
    finish(&report, args.json)
}
