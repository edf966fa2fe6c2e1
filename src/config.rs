//! Dispatcher and gateway configuration.
//!
//! Sources, lowest precedence first: built-in defaults, a YAML file, then
//! `QD_*` environment variables. Unparsable environment values are ignored.

use crate::batch::BatchSizeConfig;
use crate::dispatch::PollConfig;
use crate::resilience::RetryConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub batch: BatchSizeConfig,
    /// Flush trigger cadence. Must be shorter than `batch.stale_after_ms`.
    pub tick_interval_ms: u64,
    /// Worker-count hint passed to the gateway with every submission.
    pub concurrency_hint: usize,
    pub retry: RetryConfig,
    pub poll: PollConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch: BatchSizeConfig::default(),
            tick_interval_ms: 500,
            concurrency_hint: 10,
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.batch.small_size = env_or("QD_BATCH_SMALL", self.batch.small_size);
        self.batch.large_size = env_or("QD_BATCH_LARGE", self.batch.large_size);
        self.batch.size_threshold = env_or("QD_BATCH_THRESHOLD", self.batch.size_threshold);
        self.batch.stale_after_ms = env_or("QD_BATCH_STALE_MS", self.batch.stale_after_ms);
        self.tick_interval_ms = env_or("QD_TICK_MS", self.tick_interval_ms);
        self.concurrency_hint = env_or("QD_MAX_WORKERS", self.concurrency_hint);
        self.poll.max_polls = env_or("QD_MAX_POLLS", self.poll.max_polls);
        self.retry.max_attempts = env_or("QD_RETRY_ATTEMPTS", self.retry.max_attempts);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str, details: String| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(field)
                    .with_details(details)
                    .with_source("config"),
            ))
        };

        if self.batch.small_size == 0 || self.batch.large_size == 0 {
            return invalid(
                "batch",
                "batch sizes must be at least 1",
                format!("small={}, large={}", self.batch.small_size, self.batch.large_size),
            );
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms", "tick interval must be positive", "0".into());
        }
        if self.tick_interval_ms >= self.batch.stale_after_ms {
            return invalid(
                "tick_interval_ms",
                "tick interval must be shorter than the stale window",
                format!(
                    "tick={}ms, stale={}ms",
                    self.tick_interval_ms, self.batch.stale_after_ms
                ),
            );
        }
        if self.poll.max_polls == 0 {
            return invalid("poll.max_polls", "max_polls must be at least 1", "0".into());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts", "max_attempts must be at least 1", "0".into());
        }
        Ok(())
    }
}

/// Settings for [`crate::transport::HttpGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Whole-request timeout. Analysis backends answer slowly under load.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub proxy_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/".to_string(),
            timeout_secs: 600,
            connect_timeout_secs: 60,
            pool_max_idle_per_host: 32,
            proxy_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_url: env::var("QD_GATEWAY_URL").unwrap_or(default.base_url),
            timeout_secs: env_or("QD_HTTP_TIMEOUT_SECS", default.timeout_secs),
            connect_timeout_secs: env_or("QD_HTTP_CONNECT_TIMEOUT_SECS", default.connect_timeout_secs),
            pool_max_idle_per_host: env_or(
                "QD_HTTP_POOL_MAX_IDLE_PER_HOST",
                default.pool_max_idle_per_host,
            ),
            proxy_url: env::var("QD_PROXY_URL").ok().or(default.proxy_url),
        }
    }
}

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}
