//! # Keel
//!
//! Dependency-aware schema migrations for PostgreSQL.
//!
//! Keel provides:
//! - Ordering of plain SQL scripts by what they create and reference
//! - Exactly-once, transactional execution tracked in a ledger table
//! - A cluster-wide advisory lock so concurrent deployments never interleave
//! - Validation against an expected-schema manifest, with drift detection
//! - Idempotent seeding of baseline rows
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PgConfig::from_url("postgresql://localhost/mydb")?;
//!     let mut db = PgMigrationDatabase::connect(&config).await?;
//!
//!     let engine = MigrationEngine::new(MigrationConfig::default());
//!     let report = engine.run(&mut db).await;
//!     assert!(report.success, "{}", report.summary());
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The migration engine: loading, ordering, execution and validation.
pub mod migrate {
    pub use keel_migrate::*;
}

/// The PostgreSQL backend.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use keel_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        ExpectedSchemaManifest, LockMode, MigrateResult, MigrationConfig, MigrationEngine,
        MigrationError, RetryPolicy, RunReport, SeedFile, Strictness,
    };
    #[cfg(feature = "postgres")]
    pub use crate::postgres::{PgConfig, PgMigrationDatabase};
}

// Re-export key types at the crate root
pub use migrate::{MigrationEngine, MigrationError, RunReport};
