use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use dbfsync_config::FeedConfig;
use dbfsync_core::Feed;
use dbfsync_http::{ClientConfig, RetryPolicy};

use crate::env;

/// Project configuration from dbfsync.toml
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Fixed key/value sent with every request, e.g. the company name.
    pub context_key: Option<String>,
    pub context_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_state_path")]
    pub state_path: String,
    #[serde(default = "default_feeds_dir")]
    pub feeds_dir: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            interval_secs: default_interval_secs(),
            state_path: default_state_path(),
            feeds_dir: default_feeds_dir(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    50
}

fn default_interval_secs() -> u64 {
    60
}

fn default_state_path() -> String {
    "dbfsync_state.json".to_string()
}

fn default_feeds_dir() -> String {
    "dbfsync/feeds".to_string()
}

/// Resolve environment variables in a string.
/// Supports ${VAR_NAME} syntax; unset variables resolve to empty.
pub fn resolve_env(s: &str) -> String {
    let mut result = s.to_string();

    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        } else {
            break;
        }
    }

    result
}

impl ProjectConfig {
    /// Read, parse and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(content)?;
        if config.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        Ok(config)
    }

    /// Apply DBFSYNC_* overrides from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env::get_batch_size() {
            self.sync.batch_size = v;
        }
        if let Some(v) = env::get_max_attempts() {
            self.api.max_attempts = v;
        }
        if let Some(v) = env::get_timeout_secs() {
            self.api.timeout_secs = v;
        }
        if let Some(v) = env::get_interval_secs() {
            self.sync.interval_secs = v;
        }
    }

    /// Get the resolved API base URL.
    pub fn base_url(&self) -> String {
        resolve_env(&self.api.base_url)
    }

    pub fn client_config(&self) -> ClientConfig {
        let context = match (&self.api.context_key, &self.api.context_value) {
            (Some(key), Some(value)) => Some((resolve_env(key), resolve_env(value))),
            _ => None,
        };

        ClientConfig {
            base_url: self.base_url(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            context,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.api.max_attempts,
            Duration::from_millis(self.api.backoff_base_ms),
        )
    }

    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(resolve_env(&self.sync.state_path))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    /// Load all feeds from the feeds directory, ordered by file name.
    pub fn load_feeds(&self) -> Result<Vec<Feed>> {
        let feeds_dir = PathBuf::from(resolve_env(&self.sync.feeds_dir));

        if !feeds_dir.exists() {
            return Ok(vec![]);
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&feeds_dir)
            .with_context(|| format!("Failed to read feeds directory: {}", feeds_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut feeds = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read feed: {}", path.display()))?;

            let config = FeedConfig::parse(&resolve_env(&content))
                .with_context(|| format!("Failed to parse feed: {}", path.display()))?;

            let feed = dbfsync_config::to_feed(&config)
                .with_context(|| format!("Invalid feed: {}", path.display()))?;

            feeds.push(feed);
        }

        dbfsync_config::validate_feed_set(&feeds)?;
        Ok(feeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_resolve_env() {
        std::env::set_var("DBFSYNC_TEST_VAR", "hello");

        assert_eq!(resolve_env("${DBFSYNC_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env("prefix_${DBFSYNC_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env("no_vars"), "no_vars");
        assert_eq!(resolve_env("${DBFSYNC_TEST_UNSET_VAR}x"), "x");

        std::env::remove_var("DBFSYNC_TEST_VAR");
    }

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::parse("[api]\nbase_url = \"http://localhost:3000/api\"\n").unwrap();

        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.max_attempts, 3);
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.state_path(), PathBuf::from("dbfsync_state.json"));
        assert!(config.client_config().context.is_none());
        assert_eq!(config.retry_policy().base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_empty_base_url_rejected() {
        assert!(ProjectConfig::parse("[api]\nbase_url = \"\"\n").is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("DBFSYNC_BATCH_SIZE", "25");
        std::env::set_var("DBFSYNC_MAX_ATTEMPTS", "not-a-number");

        let mut config = ProjectConfig::parse("[api]\nbase_url = \"http://x\"\n").unwrap();
        config.apply_env_overrides();

        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.api.max_attempts, 3);

        std::env::remove_var("DBFSYNC_BATCH_SIZE");
        std::env::remove_var("DBFSYNC_MAX_ATTEMPTS");
    }

    #[test]
    fn test_context_pair() {
        let config = ProjectConfig::parse(
            "[api]\nbase_url = \"http://x\"\ncontext_key = \"company_name\"\ncontext_value = \"Flexiempaques\"\n",
        )
        .unwrap();

        assert_eq!(
            config.client_config().context,
            Some(("company_name".to_string(), "Flexiempaques".to_string()))
        );
    }

    #[test]
    fn test_load_feeds_sorted() {
        let dir = TempDir::new().unwrap();
        let feeds_dir = dir.path().join("feeds");
        fs::create_dir_all(&feeds_dir).unwrap();
        for (file, name) in [("b.toml", "inventory"), ("a.toml", "orders")] {
            fs::write(
                feeds_dir.join(file),
                format!(
                    "name = \"{name}\"\nsource = \"{name}.dbf\"\n\n[endpoint]\nresource = \"{name}\"\n\n[mapping]\nkey = {{ source = \"ID\", target = \"id\" }}\n"
                ),
            )
            .unwrap();
        }
        fs::write(feeds_dir.join("notes.txt"), "ignored").unwrap();

        let mut config = ProjectConfig::parse("[api]\nbase_url = \"http://x\"\n").unwrap();
        config.sync.feeds_dir = feeds_dir.display().to_string();

        let feeds = config.load_feeds().unwrap();
        let names: Vec<&str> = feeds.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "inventory"]);
    }

    #[test]
    fn test_missing_feeds_dir_is_empty() {
        let mut config = ProjectConfig::parse("[api]\nbase_url = \"http://x\"\n").unwrap();
        config.sync.feeds_dir = "/nonexistent/dbfsync/feeds".into();
        assert!(config.load_feeds().unwrap().is_empty());
    }
}
