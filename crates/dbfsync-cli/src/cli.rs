use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dbfsync")]
#[command(about = "Push changed dBASE records to an HTTP API")]
#[command(version)]
pub struct Cli {
    /// Path to dbfsync.toml config file
    #[arg(short, long, global = true, default_value = "dbfsync.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize dbfsync in the current directory (creates config files)
    Init,

    /// Watch the configured feeds and deliver changed records
    Run {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,

        /// Scan files even when their size and modification time are unchanged
        #[arg(long)]
        force: bool,
    },

    /// Show current sync status
    Status,

    /// Forget stored state so records are sent again
    Reset {
        /// Reset a single feed by name
        #[arg(long, conflicts_with = "all")]
        feed: Option<String>,

        /// Reset every file in the state store
        #[arg(long)]
        all: bool,
    },
}
