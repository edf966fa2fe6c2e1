use super::core::Dispatcher;
use crate::config::DispatcherConfig;
use crate::transport::JobGateway;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Builder for [`Dispatcher`].
///
/// Only the gateway is mandatory. Without an explicit runtime handle the
/// builder must run inside a Tokio runtime.
pub struct DispatcherBuilder {
    gateway: Option<Arc<dyn JobGateway>>,
    config: DispatcherConfig,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            gateway: None,
            config: DispatcherConfig::default(),
            runtime: None,
        }
    }

    pub fn gateway(mut self, gateway: Arc<dyn JobGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Apply `QD_*` environment overrides on top of the current config.
    pub fn env_overrides(mut self) -> Self {
        self.config = self.config.with_env_overrides();
        self
    }

    /// Runtime that batch tasks and the flush trigger are spawned on.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        self.config.validate()?;
        let gateway = self.gateway.ok_or_else(|| {
            Error::configuration_with_context(
                "a job gateway is required",
                ErrorContext::new()
                    .with_field_path("gateway")
                    .with_source("dispatcher_builder"),
            )
        })?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| {
                Error::runtime_with_context(
                    "dispatcher must be created inside a Tokio runtime",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source("dispatcher_builder"),
                )
            })?,
        };
        Ok(Dispatcher::start(gateway, self.config, runtime))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
