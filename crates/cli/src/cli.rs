// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! CLI argument parsing with clap derive.

use clap::{Parser, Subcommand};

/// A staged, resumable branch-deployment engine for SQL Server databases
#[derive(Parser)]
#[command(name = "dbbm")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the active release to the target databases
    Deploy(DeployArgs),
    /// Maintain the backup cache
    Cache(CacheArgs),
}

#[derive(clap::Args)]
pub struct DeployArgs {
    /// Override the default active release
    #[arg(short = 'r', long = "release", value_name = "NAME")]
    pub release: Option<String>,

    /// Override the default environment
    #[arg(short = 'e', long = "env", value_name = "NAME", env = "DBBM_ENV")]
    pub env: Option<String>,

    /// No side effects: calculate and log what would happen
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Start from the hash recorded by the last interrupted run
    #[arg(short = 's', long = "resume")]
    pub resume: bool,

    /// Run without the backup cache (no hits, no adds, no GC)
    #[arg(short = 'C', long = "no-cache")]
    pub no_cache: bool,

    /// Disable the terminal bell
    #[arg(short = 'B', long = "no-beeps")]
    pub no_beeps: bool,
}

#[derive(clap::Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Delete orphans, drop forgotten entries, enforce the size bound
    Gc,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
