use anyhow::{Context, Result};
use colored::Colorize;

use dbfsync_state::{JsonStateStore, StateStore};

use crate::config::ProjectConfig;

pub fn cmd_reset(config: ProjectConfig, feed: Option<&str>, all: bool) -> Result<()> {
    let store = JsonStateStore::open(config.state_path());
    let mut state = store.load();

    let removed = match (feed, all) {
        (_, true) => {
            let count = state.files.len();
            state.files.clear();
            count
        }
        (Some(name), false) => {
            let feeds = config.load_feeds()?;
            let feed = feeds
                .iter()
                .find(|f| f.name == name)
                .with_context(|| format!("Feed '{}' not found", name))?;
            usize::from(state.forget(&feed.state_key()))
        }
        (None, false) => anyhow::bail!("Specify --feed <NAME> or --all"),
    };

    if removed == 0 {
        println!("Nothing to reset.");
        return Ok(());
    }

    store.save(&state).context("Failed to save state")?;
    println!(
        "{}",
        format!("Reset {} file(s). Their records will be sent again on the next run.", removed)
            .green()
    );
    Ok(())
}
