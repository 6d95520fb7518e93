mod commands;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use calfeed_core::FeedConfig;
use calfeed_core::config::expand_path;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calfeed")]
#[command(about = "Merge several ICS calendar feeds into one agenda")]
struct Cli {
    /// Use this config file instead of ~/.config/calfeed/config.toml
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log fetches and window updates to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every calendar once and print the merged agenda
    Events {
        /// How long to wait for slow calendars (e.g. "10s", "1m")
        #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
        wait: Duration,

        /// Print the agenda as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep polling and reprint the agenda whenever it changes
    Watch,
    /// Show whether each calendar could be fetched
    Status {
        #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
        wait: Duration,
    },
    /// Show the config location and the effective settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = resolve_config_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Events { wait, json } => {
            let config = load_config(&config_path)?;
            require_calendars(&config)?;
            commands::events::run(&config, wait, json).await
        }
        Commands::Watch => {
            let config = load_config(&config_path)?;
            require_calendars(&config)?;
            commands::watch::run(&config).await
        }
        Commands::Status { wait } => {
            let config = load_config(&config_path)?;
            require_calendars(&config)?;
            commands::status::run(&config, wait).await
        }
        Commands::Config => {
            let config = load_config(&config_path)?;
            commands::config::run(&config_path, &config)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "calfeed=debug,calfeed_core=debug"
    } else {
        "calfeed=info,calfeed_core=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// An explicit `--config` must exist; the default location gets a template.
fn resolve_config_path(explicit: Option<&str>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand_path(path)),
        None => {
            let path = FeedConfig::config_path()?;
            if !path.exists() {
                FeedConfig::create_default_config(&path)?;
                eprintln!("Created default config at {}", path.display());
            }
            Ok(path)
        }
    }
}

fn load_config(path: &std::path::Path) -> Result<FeedConfig> {
    Ok(FeedConfig::load_from(path)?)
}

fn require_calendars(config: &FeedConfig) -> Result<()> {
    if config.calendars.is_empty() {
        anyhow::bail!(
            "No calendars configured.\n\n\
            Add one to your config.toml:\n  \
            [[calendars]]\n  \
            url = \"https://example.com/calendar.ics\"\n\n\
            Run `calfeed config` to see where the file lives."
        );
    }

    Ok(())
}
