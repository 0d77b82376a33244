//! tileworker CLI - Command-line interface
//!
//! Parses vector tiles on the worker pool and inspects configuration.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigCommands;
use commands::resolve::ResolveOverrides;
use error::CliError;

#[derive(Parser)]
#[command(name = "tileworker")]
#[command(version, about = "Quantize vector tile geometry on a pool of worker threads", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.tileworker/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse every tile in a JSON file and print the quantized result
    Quantize {
        /// JSON file holding an array of tiles
        #[arg(long)]
        input: PathBuf,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Show the worker bootstrap location and which resolver chose it
    Resolve {
        /// Worker entry, overriding the configured one
        #[arg(long)]
        entry: Option<String>,

        /// Explicit worker location, tried before anything else
        #[arg(long = "override")]
        override_location: Option<String>,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Quantize { input, pretty } => commands::quantize::run(&input, config, pretty),
        Commands::Resolve {
            entry,
            override_location,
        } => commands::resolve::run(
            config,
            ResolveOverrides {
                entry,
                override_location,
            },
        ),
        Commands::Config { command } => {
            commands::config::run(command.unwrap_or(ConfigCommands::Show), config)
        }
    }
}
