//! Tidemirror CLI
//!
//! Fetches URLs through the mirror pool and inspects the mirror configuration.
//! Logs go to stderr so fetched bodies can be piped from stdout.

#![allow(clippy::print_stdout, clippy::print_stderr, reason = "CLI tool writes to the terminal")]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use tidemirror_core::modules::config as core_config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config(ConfigCommands::Init { force }) => {
            commands::init_config(config_path, force)?;
        },
        Commands::Config(ConfigCommands::Show { json }) => {
            let config = core_config::load_config(config_path)?;
            commands::show_config(&config, config_path, json)?;
        },
        Commands::Targets { api, region, json } => {
            let config = core_config::load_config(config_path)?;
            commands::list_targets(&config, api, region, json)?;
        },
        Commands::Fetch { url, api, quality, region, require_field, output, report } => {
            let config = core_config::load_config(config_path)?;
            let args =
                commands::FetchArgs { url, api, quality, region, require_field, output, report };
            commands::fetch(&config, args).await?;
        },
    }

    Ok(())
}
