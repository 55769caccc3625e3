use anyhow::Result;
use chrono::DateTime;

use dbfsync_state::{FileState, JsonStateStore, StateStore};

use crate::config::ProjectConfig;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn cmd_status(config: ProjectConfig) -> Result<()> {
    let feeds = config.load_feeds()?;
    let state = JsonStateStore::open(config.state_path()).load();

    if state.files.is_empty() {
        println!("No sync state found. Run 'dbfsync run' to start syncing.");
        return Ok(());
    }

    println!("\nSync Status:");
    println!(
        "{:<20} {:<30} {:>12} {:>20} {:>12} {:>12} {:>20}",
        "Feed", "Source", "Size", "Modified", "Mark", "Delivered", "Updated"
    );
    println!("{:-<134}", "");

    for (path, file) in &state.files {
        let feed = feeds
            .iter()
            .find(|f| &f.state_key() == path)
            .map(|f| f.name.as_str())
            .unwrap_or("-");
        println!("{}", status_row(feed, path, file));
    }

    println!();
    Ok(())
}

fn status_row(feed: &str, path: &str, file: &FileState) -> String {
    let size = file
        .size
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let modified = file
        .mtime
        .and_then(format_mtime)
        .unwrap_or_else(|| "-".to_string());
    let mark = match (&file.digests, file.high_water) {
        (_, Some(high_water)) => format!("seq {}", high_water),
        (Some(digests), None) => format!("{} hashes", digests.len()),
        (None, None) => "-".to_string(),
    };
    let updated = file
        .updated_at
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{:<20} {:<30} {:>12} {:>20} {:>12} {:>12} {:>20}",
        feed, path, size, modified, mark, file.records_delivered, updated
    )
}

/// Seconds since the epoch as a UTC timestamp.
fn format_mtime(mtime: f64) -> Option<String> {
    if !mtime.is_finite() {
        return None;
    }
    let secs = mtime.floor();
    let nanos = ((mtime - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos).map(|t| t.format(TIME_FORMAT).to_string())
}
