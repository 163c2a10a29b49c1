//! `keel version` command - Display version information.

use keel_migrate::{DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_KEY, Strictness};

use crate::error::CliResult;
use crate::output::{self, kv};

/// Package version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
const NAME: &str = env!("CARGO_PKG_NAME");

/// Run the version command
pub async fn run() -> CliResult<()> {
    output::logo();
    output::newline();

    kv("Version", VERSION);
    kv("Binary", NAME);

    #[cfg(debug_assertions)]
    let build_mode = "debug";
    #[cfg(not(debug_assertions))]
    let build_mode = "release";

    kv("Build", build_mode);

    output::newline();

    output::section("Defaults");
    kv("Ledger table", DEFAULT_LEDGER_TABLE);
    kv("Lock key", &DEFAULT_LOCK_KEY.to_string());
    kv("Strictness", Strictness::default().as_str());

    output::newline();

    output::section("Components");
    kv("keel-migrate", VERSION);
    kv("keel-postgres", VERSION);

    Ok(())
}
