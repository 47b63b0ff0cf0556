//! Configuration management.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::crawler::CrawlConfig;

/// Harvester configuration. Values come from an optional config file overlaid
/// with `SCHOLAR_HARVEST_*` environment variables; everything has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Persisted dataset file.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Cached last known-good session (cookies). Absence is normal.
    #[serde(default = "default_session_cache_path")]
    pub session_cache_path: PathBuf,

    /// Publications older than this many days are re-scraped.
    #[serde(default = "default_threshold_days")]
    pub rescrape_threshold_days: u32,

    /// Explicit target ids. Non-empty overrides freshness-driven selection.
    #[serde(default)]
    pub scholar_ids: Vec<String>,

    /// Fetch attempts per author, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_author: u32,

    /// Wall-clock budget per author before the run is treated as blocked.
    #[serde(default = "default_max_time_per_author")]
    pub max_time_per_author_secs: u64,

    /// First retry backoff.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Retry backoff cap.
    #[serde(default = "default_backoff_ceiling")]
    pub backoff_ceiling_secs: u64,

    /// Pause between consecutive authors.
    #[serde(default = "default_pace")]
    pub pace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            session_cache_path: default_session_cache_path(),
            rescrape_threshold_days: default_threshold_days(),
            scholar_ids: Vec::new(),
            max_retries_per_author: default_max_retries(),
            max_time_per_author_secs: default_max_time_per_author(),
            backoff_base_secs: default_backoff_base(),
            backoff_ceiling_secs: default_backoff_ceiling(),
            pace_secs: default_pace(),
        }
    }
}

impl Config {
    /// Crawl tunables derived from this configuration.
    pub fn crawl(&self) -> CrawlConfig {
        CrawlConfig {
            max_retries_per_author: self.max_retries_per_author.max(1),
            max_time_per_author: Duration::from_secs(self.max_time_per_author_secs),
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            backoff_ceiling: Duration::from_secs(self.backoff_ceiling_secs),
            pace: Duration::from_secs(self.pace_secs),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("results.json")
}

fn default_session_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("scholar-harvest")
        .join("last_solved_session.json")
}

fn default_threshold_days() -> u32 {
    7
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_time_per_author() -> u64 {
    30
}

fn default_backoff_base() -> u64 {
    1
}

fn default_backoff_ceiling() -> u64 {
    60
}

fn default_pace() -> u64 {
    3
}

/// Load configuration from a file plus environment overlay. A missing file
/// falls back to defaults; a malformed one is an error.
pub fn load_config(path: Option<&PathBuf>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();

    match path {
        Some(path) => {
            builder = builder.add_source(config::File::from(path.as_path()));
        }
        None => {
            builder = builder.add_source(config::File::with_name("config").required(false));
        }
    }

    builder
        .add_source(config::Environment::with_prefix("SCHOLAR_HARVEST"))
        .build()?
        .try_deserialize()
}
