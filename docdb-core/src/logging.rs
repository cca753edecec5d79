// Logging and tracing setup for harness runs
// Structured output via tracing-subscriber, safe to initialise from every test

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, Span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub with_target: bool,
    /// Route output through the test writer so `cargo test` captures it
    pub test_writer: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            with_target: true,
            test_writer: true,
        }
    }
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    level: Option<LogLevel>,
    format: Option<LogFormat>,
    with_target: Option<bool>,
    test_writer: Option<bool>,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = Some(enabled);
        self
    }

    pub fn test_writer(mut self, enabled: bool) -> Self {
        self.test_writer = Some(enabled);
        self
    }

    pub fn build(self) -> LogConfig {
        let default = LogConfig::default();
        LogConfig {
            level: self.level.unwrap_or(default.level),
            format: self.format.unwrap_or(default.format),
            with_target: self.with_target.unwrap_or(default.with_target),
            test_writer: self.test_writer.unwrap_or(default.test_writer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed, which happens whenever more than
/// one test in the same binary calls this.
pub fn init_logging(config: LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(config.with_target);

    let installed = match (config.format, config.test_writer) {
        (LogFormat::Json, true) => builder.json().with_test_writer().try_init().is_ok(),
        (LogFormat::Json, false) => builder.json().try_init().is_ok(),
        (LogFormat::Pretty, true) => builder.pretty().with_test_writer().try_init().is_ok(),
        (LogFormat::Pretty, false) => builder.pretty().try_init().is_ok(),
        (LogFormat::Compact, true) => builder.compact().with_test_writer().try_init().is_ok(),
        (LogFormat::Compact, false) => builder.compact().try_init().is_ok(),
    };

    if installed {
        debug!(level = config.level.as_str(), format = ?config.format, "logging initialized");
    }
    installed
}

pub fn create_span(name: &str) -> Span {
    tracing::info_span!("operation", name = name)
}

pub fn generate_correlation_id() -> String {
    format!("corr_{}", CORRELATION_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Activity ids identify a single service round trip in logs and error reports
pub fn generate_activity_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .format(LogFormat::Json)
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.with_target);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(LogConfig::default());
        assert!(!init_logging(LogConfig::default()));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        assert_ne!(generate_correlation_id(), generate_correlation_id());
        assert_eq!(generate_activity_id().len(), 36);
    }
}
