//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use keel_migrate::Strictness;
use std::path::PathBuf;

/// Keel - dependency-aware schema migrations
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "Keel - dependency-aware schema migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "keel.toml")]
    pub config: PathBuf,

    /// Migrations directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Expected-schema manifest (overrides the config file)
    #[arg(short, long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending migrations, validate the schema and seed
    Migrate(MigrateArgs),

    /// Show the resolved execution order without touching a database
    Plan(PlanArgs),

    /// Apply every script to an in-memory database and validate it
    Rehearse(RehearseArgs),

    /// Compare the ledger with the migration files
    Status(StatusArgs),

    /// Validate the live schema against the manifest
    Validate(ValidateArgs),

    /// Insert baseline rows that are not already present
    Seed(SeedArgs),

    /// Print a draft manifest derived from the scripts
    Manifest(ManifestArgs),

    /// Display version information
    Version,
}

// =============================================================================
// Migrate Command
// =============================================================================

/// Arguments for the `migrate` command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Report what would run without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Wait for the migration lock instead of failing fast
    #[arg(long)]
    pub wait: bool,

    /// Seconds to wait for the lock with --wait
    #[arg(long, default_value_t = 300)]
    pub wait_timeout: u64,

    /// How far completed ledger records are trusted
    #[arg(long, value_enum)]
    pub strictness: Option<StrictnessArg>,

    /// Skip seeding after the migrations
    #[arg(long)]
    pub skip_seed: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Ledger trust levels
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum StrictnessArg {
    /// Trust every completed record with a matching checksum
    TrustLedger,
    /// On drift, re-run the scripts that create missing objects
    RevalidateAffected,
    /// On drift, re-run every script
    RevalidateAll,
}

impl From<StrictnessArg> for Strictness {
    fn from(arg: StrictnessArg) -> Self {
        match arg {
            StrictnessArg::TrustLedger => Strictness::TrustLedger,
            StrictnessArg::RevalidateAffected => Strictness::RevalidateAffected,
            StrictnessArg::RevalidateAll => Strictness::RevalidateAll,
        }
    }
}

// =============================================================================
// Offline Commands
// =============================================================================

/// Arguments for the `plan` command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `rehearse` command
#[derive(Args, Debug)]
pub struct RehearseArgs {
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `manifest` command
#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Write the draft to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file
    #[arg(short, long)]
    pub force: bool,
}

// =============================================================================
// Database Commands
// =============================================================================

/// Arguments for the `status` command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Print the validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `seed` command
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Path to seed file (overrides the config file)
    #[arg(short, long)]
    pub seed_file: Option<PathBuf>,

    /// Print the seed report as JSON
    #[arg(long)]
    pub json: bool,
}
