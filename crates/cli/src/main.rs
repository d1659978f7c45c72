// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! dbbm CLI entry point.

use clap::{CommandFactory, Parser};
use tracing_subscriber::{EnvFilter, fmt};

use dbbm::cli::{Cli, Command};
use dbbm::error::ExitCode;
use dbbm::{cmd_cache, cmd_deploy};

fn init_logging() {
    let filter = EnvFilter::try_from_env("DBBM_LOG").unwrap_or_else(|_| EnvFilter::new("off"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();

    let exit_code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dbbm: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
            match e.downcast_ref::<dbbm::Error>() {
                Some(err) => ExitCode::from(err),
                None => ExitCode::InternalError,
            }
        }
    };

    std::process::exit(exit_code as i32);
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.command {
        None => {
            // Show help for bare invocation
            Cli::command().print_help()?;
            println!();
            Ok(ExitCode::Success)
        }
        Some(Command::Deploy(args)) => {
            cmd_deploy::run_deploy(args)?;
            Ok(ExitCode::Success)
        }
        Some(Command::Cache(args)) => {
            cmd_cache::run_cache(args)?;
            Ok(ExitCode::Success)
        }
    }
}
