#![deny(unsafe_code)]

mod commands;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{mount, strategies};

/// Mount WebDAV shares with the host's native tooling
#[derive(Parser)]
#[command(name = "oxdavmount")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Show which mount strategies work on this machine
    oxdavmount strategies

    # Mount an unlocked vault's WebDAV share and open it
    oxdavmount mount http://localhost:42427/a1b2c3/vault/ --reveal

    # Mount over TLS with gvfs
    oxdavmount mount https://localhost:42427/a1b2c3/vault/ --scheme davs
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List mount strategies and whether they apply to this host
    Strategies(strategies::Args),

    /// Mount a WebDAV URI, wait for Ctrl+C, then unmount
    Mount(mount::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up tracing based on verbosity (skip if quiet)
    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Strategies(args) => strategies::execute(args),
        Commands::Mount(args) => mount::execute(args, cli.quiet),
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
