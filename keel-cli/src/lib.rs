//! Keel CLI - command-line interface for the keel migration engine.
//!
//! This crate provides the `keel` binary: applying migrations, planning and
//! rehearsing them offline, inspecting the ledger, validating the schema
//! and seeding baseline data.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
