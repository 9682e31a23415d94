//! Speval CLI - Speech Enhancement Evaluation
//!
//! Command-line entry point for corpus evaluation runs.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use speval::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("Speval v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Speval v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Evaluate(args) => {
            speval::cli::commands::evaluate(args).context("corpus evaluation failed")
        }
        Commands::EvaluateNoref(args) => speval::cli::commands::evaluate_noref(args)
            .context("no-reference evaluation failed"),
    }
}
