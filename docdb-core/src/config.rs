// Harness configuration
// Where the suite points its client and how long validations may wait

use crate::feed::FeedOptions;
use crate::logging::{LogConfig, LogFormat};
use std::env;
use std::time::Duration;

pub const ENV_ENDPOINT: &str = "DOCDB_ENDPOINT";
pub const ENV_MASTER_KEY: &str = "DOCDB_MASTER_KEY";
pub const ENV_TIMEOUT_MS: &str = "DOCDB_TIMEOUT_MS";
pub const ENV_PAGE_SIZE: &str = "DOCDB_PAGE_SIZE";
pub const ENV_LOG_FORMAT: &str = "DOCDB_LOG_FORMAT";

/// Default bound on a single validation call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Page size the service applies when a request does not set one
pub const DEFAULT_MAX_ITEM_COUNT: usize = 100;

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Service endpoint; `None` runs the suite against the in-process emulator
    pub endpoint: Option<String>,
    /// Account master key (base64)
    pub master_key: Option<String>,
    /// Bound applied to every validation call
    pub timeout: Duration,
    /// Page size used by fixtures that do not pick their own
    pub max_item_count: usize,
    pub log: LogConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            master_key: None,
            timeout: DEFAULT_TIMEOUT,
            max_item_count: DEFAULT_MAX_ITEM_COUNT,
            log: LogConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }

    /// Load configuration from `DOCDB_*` environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            builder = builder.endpoint(endpoint);
        }
        if let Some(key) = lookup(ENV_MASTER_KEY).filter(|v| !v.trim().is_empty()) {
            builder = builder.master_key(key);
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS).and_then(|v| v.parse::<u64>().ok()) {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(size) = lookup(ENV_PAGE_SIZE).and_then(|v| v.parse::<usize>().ok()) {
            builder = builder.max_item_count(size);
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).and_then(|v| LogFormat::parse(&v)) {
            builder = builder.log(LogConfig::builder().format(format).build());
        }

        builder.build()
    }

    /// Endpoint and master key, when both are configured
    pub fn live_account(&self) -> Option<(&str, &str)> {
        match (&self.endpoint, &self.master_key) {
            (Some(endpoint), Some(key)) => Some((endpoint, key)),
            _ => None,
        }
    }

    /// True when no live endpoint is configured
    pub fn uses_emulator(&self) -> bool {
        self.live_account().is_none()
    }

    /// Feed options carrying the configured page size
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions::new().max_item_count(self.max_item_count)
    }
}

#[derive(Default)]
pub struct HarnessConfigBuilder {
    endpoint: Option<String>,
    master_key: Option<String>,
    timeout: Option<Duration>,
    max_item_count: Option<usize>,
    log: Option<LogConfig>,
}

impl HarnessConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_item_count(mut self, count: usize) -> Self {
        self.max_item_count = Some(count);
        self
    }

    pub fn log(mut self, log: LogConfig) -> Self {
        self.log = Some(log);
        self
    }

    pub fn build(self) -> HarnessConfig {
        let default = HarnessConfig::default();
        HarnessConfig {
            endpoint: self.endpoint.or(default.endpoint),
            master_key: self.master_key.or(default.master_key),
            timeout: self.timeout.unwrap_or(default.timeout),
            max_item_count: self
                .max_item_count
                .filter(|count| *count > 0)
                .unwrap_or(default.max_item_count),
            log: self.log.unwrap_or(default.log),
        }
    }
}
