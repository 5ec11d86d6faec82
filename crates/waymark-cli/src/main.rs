//! Waymark CLI - run patrol fleet simulations from a TOML description.

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use waymark::prelude::WaymarkError;

#[derive(Parser)]
#[command(name = "waymark")]
#[command(author, version, about = "Waymark - stigmergic patrol fleets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: waymark.toml in the current or a parent directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default waymark.toml
    Init {
        /// Project directory (default: current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Run the fleet simulation
    Run {
        /// Number of ticks to run (default: from config)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Print the final fleet snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the meeting points and their first rendezvous ticks
    Schedule {
        /// Rendezvous ticks to list per meeting point
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },

    /// Show the initial layout and the layout after the scripted faults
    Partition,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_fatal(&err) => {
            eprintln!("{} {:#}", "fatal:".red().bold(), err);
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

/// Setup defects and broken invariants, as opposed to I/O trouble.
fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<WaymarkError>())
        .is_some_and(WaymarkError::is_fatal)
}

fn run(cli: Cli) -> Result<()> {
    init_logging(if cli.verbose { "debug" } else { "warn" })?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { path } => commands::init::run(path),
        Commands::Run { ticks, json } => commands::run::run(config_path, ticks, json),
        Commands::Schedule { count } => commands::schedule::run(config_path, count),
        Commands::Partition => commands::partition::run(config_path),
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
