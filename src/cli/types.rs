//! CLI type definitions.
//!
//! This module contains clap command structures that define the CLI
//! interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI surface.
#[derive(Parser)]
#[command(name = "replicheck")]
#[command(about = "Replicheck - Replica cluster consistency auditor", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a configuration file (defaults to ./replicheck.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Audit a replica cluster for divergence
    Check(CheckArgs),
}

/// Arguments of the `check` subcommand. Every flag overrides the value
/// merged from configuration file and environment.
#[derive(Args)]
pub struct CheckArgs {
    /// Replica base URLs to audit (repeatable). Falls back to the
    /// configured list, then to registry discovery.
    #[arg(long = "server", value_name = "URL")]
    pub servers: Vec<String>,

    /// Directory where log/failed/results artifacts are written
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Attempt budget for every transport call
    #[arg(long)]
    pub retries: Option<u32>,

    /// Number of units of work executed concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Percentage of content files to download and byte-compare (0 disables)
    #[arg(long = "pc", value_name = "PERCENT")]
    pub content_sample_percent: Option<u8>,

    /// Stop scanning entities at the first body mismatch
    #[arg(long)]
    pub fail_fast: bool,
}
