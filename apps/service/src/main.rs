#[macro_use]
extern crate rust_i18n;

// Translations for every reply and alert
i18n!("locales", fallback = "en");

mod commands;
mod config;
mod database;
mod i18n;
mod monitoring;
mod orchestrator;
mod pool;
mod transport;
mod users;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Parser)]
#[command(version, about = "Uptime monitoring with chat alerts", long_about = None)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/upbeat/config.toml)
    #[arg(long, short, global = true, env = "UPBEAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Action {
    /// Run the monitoring service (default)
    Run,
    /// Apply database migrations and exit
    Migrate,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.action.unwrap_or(Action::Run) {
        Action::Config => {
            print!("{config}");
        }
        Action::Migrate => {
            let pool = open_database(&config).await?;
            let conn = pool.get().await.map_err(|e| anyhow::anyhow!("Failed to get database connection: {e}"))?;
            database::initialize_database(&conn).await?;
            info!("Database at {} is up to date", config.database.path.display());
        }
        Action::Run => {
            let pool = open_database(&config).await?;
            Orchestrator::start(config, pool).await?;
        }
    }

    Ok(())
}

async fn open_database(config: &Config) -> Result<pool::LibsqlPool> {
    info!("Opening database at {}", config.database.path.display());
    pool::open_pool(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))
}
