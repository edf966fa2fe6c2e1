use crate::transport::GatewayError;
use std::fmt;
use thiserror::Error;

/// Where a setup failure came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Dotted config key, such as `gateway.proxy_url`.
    pub field_path: Option<String>,
    /// Offending value or accepted range.
    pub details: Option<String>,
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.field_path.is_none() && self.details.is_none() && self.source.is_none()
    }
}

/// Renders as ` (field: .., details: .., source: ..)`, or nothing when empty.
impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let labelled = [
            ("field", &self.field_path),
            ("details", &self.details),
            ("source", &self.source),
        ];
        let mut sep = " (";
        for (label, value) in labelled {
            if let Some(value) = value {
                write!(f, "{}{}: {}", sep, label, value)?;
                sep = ", ";
            }
        }
        f.write_str(")")
    }
}

/// Crate-level error for construction and configuration.
///
/// Item-level failures never surface here; they are delivered to the
/// item's error callback as a [`DispatchError`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// Runtime environment unusable, e.g. no tokio runtime to spawn on.
    #[error("Runtime error: {message}{context}")]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Terminal failure delivered to exactly one item's error callback.
///
/// `Clone` so that one batch-wide cause (a failed submission, a failed
/// remote job) can be handed to every item of that batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The item's payload could not be loaded locally.
    #[error("item data unavailable: {0}")]
    DataUnavailable(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The poll ceiling was reached before the job turned terminal.
    #[error("job did not finish within {polls} status polls")]
    PollingTimeout { polls: u32 },

    /// The gateway reported the whole job as failed.
    #[error("remote job failed: {0}")]
    RemoteJobFailed(String),

    /// The job completed but its result could not be retrieved.
    #[error("job result unavailable: {0}")]
    ResultUnavailable(String),

    /// The result list was shorter than the submitted batch.
    #[error("no result returned for item #{index}")]
    MissingResult { index: usize },

    /// The remote side processed the item and reported a failure for it.
    #[error("item failed: {0}")]
    ItemFailed(String),

    #[error("dispatcher is shut down")]
    Closed,

    /// The request was dropped before any outcome was produced.
    #[error("request abandoned before completion")]
    Abandoned,
}

impl DispatchError {
    pub fn is_transport_timeout(&self) -> bool {
        matches!(self, DispatchError::Gateway(e) if e.is_timeout())
    }

    /// Short machine-friendly class name for logs.
    pub fn class(&self) -> &'static str {
        match self {
            DispatchError::DataUnavailable(_) => "data_unavailable",
            DispatchError::Gateway(e) => e.class(),
            DispatchError::PollingTimeout { .. } => "polling_timeout",
            DispatchError::RemoteJobFailed(_) => "remote_job_failed",
            DispatchError::ResultUnavailable(_) => "result_unavailable",
            DispatchError::MissingResult { .. } => "missing_result",
            DispatchError::ItemFailed(_) => "item_failed",
            DispatchError::Closed => "closed",
            DispatchError::Abandoned => "abandoned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_formatting() {
        let err = Error::configuration_with_context(
            "tick interval must be shorter than the stale window",
            ErrorContext::new()
                .with_field_path("tick_interval_ms")
                .with_source("config"),
        );
        let text = err.to_string();
        assert!(text.contains("field: tick_interval_ms"));
        assert!(text.contains("source: config"));
        assert!(err.context().is_some());
    }

    #[test]
    fn test_empty_context_renders_nothing() {
        let err = Error::runtime_with_context("no runtime", ErrorContext::new());
        assert_eq!(err.to_string(), "Runtime error: no runtime");

        let ctx = ErrorContext::new().with_details("0");
        assert_eq!(ctx.to_string(), " (details: 0)");
    }

    #[test]
    fn test_dispatch_error_timeout_detection() {
        let timeout = DispatchError::Gateway(GatewayError::Timeout("read".into()));
        assert!(timeout.is_transport_timeout());
        assert_eq!(timeout.class(), "timeout");

        let http = DispatchError::Gateway(GatewayError::Http {
            status: 502,
            message: "bad gateway".into(),
        });
        assert!(!http.is_transport_timeout());
        assert!(!DispatchError::PollingTimeout { polls: 600 }.is_transport_timeout());
    }
}
