//! Configuration management for the uptime tracker

use crate::retention::RetentionPolicy;
use crate::store::{DEFAULT_STORAGE_KEY, is_valid_key};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// A named HTTP endpoint to probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub name: String,
    pub url: String,
}

impl ServiceTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the persisted state blob
    pub state_dir: PathBuf,

    /// Key the tracker blob is stored under
    pub storage_key: String,

    /// Services to probe
    pub targets: Vec<ServiceTarget>,

    /// Time between checks of one target
    pub check_interval: Duration,

    /// HTTP timeout for a single probe
    pub http_timeout: Duration,

    /// Successful responses slower than this count as degraded
    pub degraded_threshold: Duration,

    /// Age after which checks and resolved incidents are pruned
    pub retention_days: u32,

    /// Maximum stored checks per service
    pub max_checks_per_service: usize,

    /// Window used for periodic stats reports
    pub stats_window_days: u32,

    /// Time between stats reports while monitoring
    pub report_interval: Duration,

    /// JSON post feed to browse, if any
    pub feed_url: Option<String>,

    /// How long a fetched feed stays fresh
    pub feed_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./data"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            targets: Vec::new(),
            check_interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(10),
            degraded_threshold: Duration::from_millis(2000),
            retention_days: 30,
            max_checks_per_service: 1000,
            stats_window_days: 7,
            report_interval: Duration::from_secs(300),
            feed_url: None,
            feed_ttl: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(state_dir) = lookup("STATE_DIR") {
            config.state_dir = PathBuf::from(state_dir);
        }

        if let Some(storage_key) = lookup("STORAGE_KEY") {
            config.storage_key = storage_key;
        }

        if let Some(targets) = lookup("SERVICE_TARGETS") {
            config.targets = parse_targets(&targets);
        }

        if let Some(interval) = lookup("CHECK_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.check_interval = Duration::from_secs(seconds);
            }
        }

        if let Some(timeout) = lookup("HTTP_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.http_timeout = Duration::from_secs(seconds);
            }
        }

        if let Some(threshold) = lookup("DEGRADED_THRESHOLD_MS") {
            if let Ok(ms) = threshold.parse::<u64>() {
                config.degraded_threshold = Duration::from_millis(ms);
            }
        }

        if let Some(days) = lookup("RETENTION_DAYS") {
            if let Ok(days) = days.parse() {
                config.retention_days = days;
            }
        }

        if let Some(max_checks) = lookup("MAX_CHECKS_PER_SERVICE") {
            if let Ok(max_checks) = max_checks.parse() {
                config.max_checks_per_service = max_checks;
            }
        }

        if let Some(days) = lookup("STATS_WINDOW_DAYS") {
            if let Ok(days) = days.parse() {
                config.stats_window_days = days;
            }
        }

        if let Some(interval) = lookup("REPORT_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.report_interval = Duration::from_secs(seconds);
            }
        }

        if let Some(feed_url) = lookup("FEED_URL") {
            if !feed_url.trim().is_empty() {
                config.feed_url = Some(feed_url.trim().to_string());
            }
        }

        if let Some(ttl) = lookup("FEED_TTL_SECONDS") {
            if let Ok(seconds) = ttl.parse::<u64>() {
                config.feed_ttl = Duration::from_secs(seconds);
            }
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.storage_key.is_empty() {
            return Err("storage_key cannot be empty".to_string());
        }

        if !is_valid_key(&self.storage_key) {
            return Err(format!(
                "storage_key {:?} may only contain ASCII letters, digits, '_', '-' and '.', and must not start with '.'",
                self.storage_key
            ));
        }

        if self.check_interval.is_zero() {
            return Err("check_interval must be greater than 0".to_string());
        }

        if self.report_interval.is_zero() {
            return Err("report_interval must be greater than 0".to_string());
        }

        if self.retention_days == 0 {
            return Err("retention_days must be greater than 0".to_string());
        }

        if self.max_checks_per_service == 0 {
            return Err("max_checks_per_service must be greater than 0".to_string());
        }

        for target in &self.targets {
            if target.name.is_empty() {
                return Err(format!("target {} has an empty name", target.url));
            }

            if !target.url.starts_with("http://") && !target.url.starts_with("https://") {
                return Err(format!("target {} has a non-HTTP url: {}", target.name, target.url));
            }
        }

        let mut names: Vec<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(format!("duplicate target name: {}", pair[0]));
        }

        Ok(())
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(
            chrono::Duration::days(i64::from(self.retention_days)),
            self.max_checks_per_service,
        )
    }
}

/// Parse `name=url,name=url`. Entries without `=` are named after their url.
fn parse_targets(raw: &str) -> Vec<ServiceTarget> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) => ServiceTarget::new(name.trim(), url.trim()),
            None => ServiceTarget::new(entry, entry),
        })
        .collect()
}
