// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.command.verbose() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Cook {
            packages,
            sdk,
            build_root,
            dist_root,
            jobs,
            timeout,
            config,
            verbose,
            only,
        } => commands::cmd_cook(
            &packages,
            &sdk,
            &build_root,
            &dist_root,
            jobs,
            timeout,
            config.as_deref(),
            verbose,
            &only,
        ),
        Commands::Unpack {
            archive,
            destination,
            subpath,
            ..
        } => commands::cmd_unpack(&archive, &destination, &subpath),
        Commands::Validate { packages } => commands::cmd_validate(&packages),
    }
}
