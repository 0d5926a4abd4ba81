mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "terrasync")]
#[command(about = "Keep a local FlightGear scenery tree in sync with TerraSync mirrors")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download or refresh tiles and shared resources
    Sync {
        /// Tile names (e012n45), `models`, `airports[:ICAO]` or `navdata`
        #[arg(required = true)]
        targets: Vec<String>,
        /// Skip directories synced within `max_tile_age_secs`
        #[arg(long)]
        age_check: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List locally present tiles and their layers
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Remove tiles from the local scenery tree
    Delete {
        #[arg(required = true)]
        tiles: Vec<String>,
    },
    /// Show what a mirror serves at its root
    Probe {
        /// Mirror base URL
        url: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let app_config = config::load_config(cli.config.as_deref());

    match cli.command {
        Command::Sync {
            targets,
            age_check,
            json,
        } => commands::sync::run(&app_config, &targets, age_check, json).await,
        Command::Status { json } => commands::status::run(&app_config.enabled_roots(), json),
        Command::Delete { tiles } => commands::delete::run(&app_config.enabled_roots(), &tiles),
        Command::Probe { url } => {
            commands::probe::run(&url, &app_config.scheduler_config().downloader).await
        }
        Command::Config => commands::config::run(&app_config, cli.config.as_deref()),
    }
}
