//! Command line front end for Sopbilen: debug lookups, address registration, and the polling loop.

mod config;
mod debug;
mod entries;
mod run;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use reqwest::Client;
use sopbilen_core::{Address, EntryStore, UserInput};
use sopbilen_provider_stockholm as stockholm;

use crate::config::{Config, parse_log_level};

#[derive(Debug, Parser)]
#[command(name = "sopbilen", version, about = "Next waste collection date for a Stockholm address")]
struct Cli {
    /// configuration file
    #[arg(long, default_value = "sopbilen.toml")]
    config: PathBuf,
    /// override the configured log level
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// fetch once and print the raw response, fractions, and next pickup
    Debug {
        /// the address; several words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        address: Vec<String>,
    },
    /// register an address
    Add {
        /// display name
        #[arg(long)]
        name: Option<String>,
        /// the address; several words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        address: Vec<String>,
    },
    /// remove a registered address by entry id
    Remove {
        /// id printed by `add` or `list`
        entry_id: String,
    },
    /// list registered addresses
    List,
    /// set up all sensors and refresh them until Ctrl+C
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // help and version go to stdout with success, everything else is a usage error
            let help = matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            if err.print().is_err() || !help {
                return ExitCode::from(1);
            }
            return ExitCode::SUCCESS;
        }
    };

    match run_cli(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(1)
        }
    }
}

// Logging may not be set up yet when the configuration itself is broken.
#[allow(clippy::print_stderr, reason = "last-resort error report")]
fn report(err: &anyhow::Error) {
    eprintln!("Error: {err:#}");
}

async fn run_cli(cli: Cli) -> Result<()> {
    let (config, ignored) = load_config(&cli.config, &cli.command)?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.system.log_level));
    if let Some(err) = ignored {
        tracing::warn!("Using default configuration for debug lookup: {err:#}");
    }

    let client = Client::builder().build()?;
    let plugin = stockholm::plugin(client);
    let store = EntryStore::new(&config.system.storage_path);

    match cli.command {
        Command::Debug { address } => {
            let address = Address::new(address.join(" "));
            debug::debug_fetch(plugin.collection_port.as_ref(), &address, &mut io::stdout()).await?;
        }
        Command::Add { name, address } => {
            let input = UserInput::new(address.join(" "), name);
            entries::add(&store, &plugin.meta, input, &mut io::stdout().lock())?;
        }
        Command::Remove { entry_id } => {
            entries::remove(&store, &entry_id, &mut io::stdout().lock())?;
        }
        Command::List => entries::list(&store, &mut io::stdout().lock())?,
        Command::Run => {
            tracing::info!(config = %cli.config.display(), "sopbilen starting");
            run::run(&config, &plugin).await?;
        }
    }
    Ok(())
}

// A one-off debug lookup does not need a working configuration file.
fn load_config(path: &Path, command: &Command) -> Result<(Config, Option<anyhow::Error>)> {
    match Config::from_file(path) {
        Ok(config) => Ok((config, None)),
        Err(err) if matches!(command, Command::Debug { .. }) => Ok((Config::default(), Some(err))),
        Err(err) => Err(err),
    }
}

fn init_tracing(level: &str) {
    let max_level = parse_log_level(level).unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(io::stderr)
        .init();

    if parse_log_level(level).is_none() {
        tracing::warn!("Invalid log level '{level}', defaulting to INFO");
    }
}
