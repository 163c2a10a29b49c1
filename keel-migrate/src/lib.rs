//! # keel-migrate
//!
//! Dependency-aware schema migration engine.
//!
//! This crate provides functionality for:
//! - Loading versioned SQL scripts and checksumming them
//! - Inferring which script creates what another script references
//! - Ordering scripts by those dependencies, rejecting cycles
//! - Applying each script exactly once, transactionally, under an advisory lock
//! - Validating the resulting schema against an expected-schema manifest
//! - Seeding baseline rows that are not already present
//!
//! ## Architecture
//!
//! Everything up to the execution coordinator is pure; only the engine
//! talks to a database, through the [`MigrationDatabase`] traits.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Script Loader│────▶│ Analyzer       │────▶│ Resolver    │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                                                    │
//!                                                    ▼
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Seed Verifier│◀────│ Validator      │◀────│ Coordinator │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                                                    │
//!                                                    ▼
//!                                            ┌─────────────┐
//!                                            │ Ledger Tbl  │
//!                                            └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_migrate::{MigrationConfig, MigrationEngine};
//!
//! async fn run_migrations() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MigrationConfig::new()
//!         .migrations_dir("./migrations")
//!         .manifest_path("./migrations/schema.toml");
//!     let engine = MigrationEngine::new(config);
//!
//!     // Preflight: nothing touches the database yet
//!     let prepared = engine.prepare().await?;
//!     println!("Order: {:?}", prepared.plan.order());
//!
//!     // Run against one exclusive session
//!     let mut db = /* a MigrationDatabase implementation */;
//!     let report = engine.run_prepared(&prepared, &mut db).await;
//!     println!("{}", report.summary());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! Scripts are plain SQL files named `<sequence>_<description>.sql`:
//!
//! ```text
//! migrations/
//! ├── 0001_create_users.sql
//! ├── 0002_create_projects.sql
//! ├── 0003_index_projects.sql
//! └── schema.toml              # Expected-schema manifest
//! ```
//!
//! The sequence only breaks ties. A script that references a table or
//! column created by another script always runs after it.

pub mod analyze;
pub mod engine;
pub mod error;
pub mod file;
pub mod graph;
pub mod history;
pub mod manifest;
pub mod memory;
pub mod retry;
pub mod seed;
pub mod validate;

// Re-exports
pub use analyze::{ScriptAnalysis, SchemaObject};
pub use engine::{
    LockMode, MigrationConfig, MigrationDatabase, MigrationEngine, MigrationStatus, PreparedRun,
    RunReport, ScriptState, StatusEntry, Strictness,
};
pub use error::{FailureKind, MigrateResult, MigrationError};
pub use file::{LoaderConfig, MigrationScript, ScriptLoader, compute_checksum};
pub use graph::{DependencyGraph, ResolvedPlan};
pub use history::{
    DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_KEY, ExecutionLedger, ExecutionRecord, LedgerSql,
    RecordStatus,
};
pub use manifest::ExpectedSchemaManifest;
pub use memory::{MemoryDatabase, MemorySession};
pub use retry::RetryPolicy;
pub use seed::{DatasetReport, SeedDataset, SeedFile, SeedReport, SeedTarget, SeedVerifier};
pub use validate::{MissingColumn, SchemaCatalog, SchemaSnapshot, ValidationResult};
