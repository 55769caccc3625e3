use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use dbfsync_http::HttpClient;
use dbfsync_source::DbfSource;
use dbfsync_state::JsonStateStore;
use tokio_util::sync::CancellationToken;

use crate::config::ProjectConfig;
use crate::runner::{run_sync_loop, SyncRunner};

pub async fn cmd_run(config: ProjectConfig, once: bool, force: bool) -> Result<()> {
    let feeds = config.load_feeds()?;
    if feeds.is_empty() {
        anyhow::bail!(
            "No feeds found in {}/. Run 'dbfsync init' to create an example.",
            config.sync.feeds_dir
        );
    }
    info!(count = feeds.len(), base_url = %config.base_url(), "Loaded feeds");

    let client = HttpClient::new(config.client_config()).context("Failed to build HTTP client")?;
    let source = DbfSource::new();
    let store = JsonStateStore::open(config.state_path());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current batch");
            signal_token.cancel();
        }
    });

    let runner = SyncRunner::new(&client, &source, &store, config.retry_policy())
        .with_batch_size(config.sync.batch_size)
        .with_force(force);

    let report = run_sync_loop(&runner, &feeds, config.interval(), once, &cancel).await;

    if report.cancelled {
        println!("{}", "Stopped. Confirmed progress has been saved.".yellow());
        return Ok(());
    }

    if once {
        println!(
            "Delivered {} record(s), {} failed.",
            report.delivered(),
            report.failed()
        );
        if !report.is_success() {
            for feed in report.feeds.iter().filter(|f| !f.is_success()) {
                let reason = feed
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("{} record(s) not delivered", feed.failed));
                eprintln!("{}", format!("  {}: {}", feed.feed, reason).red());
            }
            anyhow::bail!("Sync pass finished with errors");
        }
        println!("{}", "Sync pass complete.".green());
    }

    Ok(())
}
