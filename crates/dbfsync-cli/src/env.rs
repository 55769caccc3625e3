use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Load .env file from current directory or any parent directory.
/// Searches from the current working directory up to the filesystem root,
/// loading the first .env file found. Returns its path, or `None` if there is none.
pub fn load_dotenv_from_ancestors() -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let mut current = cwd.as_path();
    loop {
        let env_path = current.join(".env");
        if env_path.exists() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("Failed to load .env from {}", env_path.display()))?;
            info!("Loaded .env from {}", env_path.display());
            return Ok(Some(env_path));
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(None),
        }
    }
}

fn get_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

pub fn get_batch_size() -> Option<usize> {
    get_parsed("DBFSYNC_BATCH_SIZE")
}

pub fn get_max_attempts() -> Option<u32> {
    get_parsed("DBFSYNC_MAX_ATTEMPTS")
}

pub fn get_timeout_secs() -> Option<u64> {
    get_parsed("DBFSYNC_TIMEOUT_SECS")
}

pub fn get_interval_secs() -> Option<u64> {
    get_parsed("DBFSYNC_INTERVAL_SECS")
}
