use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;
mod config;
mod env;
mod runner;

use cli::{Cli, Commands};
use config::ProjectConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = env::load_dotenv_from_ancestors()? {
        debug!(path = %path.display(), "Environment file loaded");
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::cmd_init(),
        Commands::Run { once, force } => {
            let config = ProjectConfig::load(&cli.config)?;
            commands::cmd_run(config, once, force).await
        }
        Commands::Status => {
            let config = ProjectConfig::load(&cli.config)?;
            commands::cmd_status(config)
        }
        Commands::Reset { feed, all } => {
            let config = ProjectConfig::load(&cli.config)?;
            commands::cmd_reset(config, feed.as_deref(), all)
        }
    }
}
