// HTTP client configuration

use std::time::Duration;

/// REST API version sent as `x-ms-version`
pub const DEFAULT_API_VERSION: &str = "2018-12-31";

/// Local emulator endpoint
pub const DEFAULT_BASE_URL: &str = "https://localhost:8081";

/// Read consistency requested through `x-ms-consistency-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    ConsistentPrefix,
    Eventual,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "Strong",
            Self::BoundedStaleness => "BoundedStaleness",
            Self::Session => "Session",
            Self::ConsistentPrefix => "ConsistentPrefix",
            Self::Eventual => "Eventual",
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Maximum number of attempts per request, including the first
    pub max_retries: u32,
    /// Account endpoint
    pub base_url: String,
    pub api_version: String,
    pub consistency_level: Option<ConsistencyLevel>,
    /// Accept self-signed certificates, as the local emulator presents one
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            max_retries: 3,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            consistency_level: None,
            accept_invalid_certs: false,
        }
    }
}

impl HttpConfig {
    /// Create a new configuration builder
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::default()
    }
}

/// HTTP configuration builder
#[derive(Default)]
pub struct HttpConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: Option<usize>,
    max_retries: Option<u32>,
    base_url: Option<String>,
    api_version: Option<String>,
    consistency_level: Option<ConsistencyLevel>,
    accept_invalid_certs: Option<bool>,
}

impl HttpConfigBuilder {
    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = Some(max);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the account endpoint; a trailing slash is dropped
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = Some(level);
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = Some(accept);
        self
    }

    /// Build the configuration
    pub fn build(self) -> HttpConfig {
        let default = HttpConfig::default();
        HttpConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(default.connect_timeout),
            pool_idle_timeout: self.pool_idle_timeout.or(default.pool_idle_timeout),
            pool_max_idle_per_host: self
                .pool_max_idle_per_host
                .unwrap_or(default.pool_max_idle_per_host),
            max_retries: self.max_retries.unwrap_or(default.max_retries),
            base_url: self.base_url.unwrap_or(default.base_url),
            api_version: self.api_version.unwrap_or(default.api_version),
            consistency_level: self.consistency_level.or(default.consistency_level),
            accept_invalid_certs: self.accept_invalid_certs.unwrap_or(default.accept_invalid_certs),
        }
    }
}
