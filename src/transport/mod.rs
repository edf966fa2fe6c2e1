//! 传输层：远程任务网关的抽象接口与 HTTP 实现。
//!
//! # Transport Module
//!
//! The dispatcher only needs three remote operations: submit a batch, poll a
//! job's status, fetch a finished job's result. [`JobGateway`] captures that
//! surface; [`HttpGateway`] implements it over the analysis backend's REST API.
//! Tests plug in scripted in-memory gateways.

mod http;

pub use http::HttpGateway;

use crate::types::{ItemPayload, JobOutcome, JobSnapshot, SubmitReceipt};
use async_trait::async_trait;

/// Classified gateway failure. Only [`GatewayError::Timeout`] is retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("transport timeout: {0}")]
    Timeout(String),

    /// DNS failure, refused connection, TLS failure and similar.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }

    pub fn class(&self) -> &'static str {
        match self {
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Unavailable(_) => "unavailable",
            GatewayError::Http { .. } => "http_error",
            GatewayError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Transport-agnostic surface of the remote job service.
#[async_trait]
pub trait JobGateway: Send + Sync {
    /// Submit one batch. Item order is the correlation key for results.
    async fn submit_batch(
        &self,
        items: &[ItemPayload],
        concurrency_hint: usize,
    ) -> Result<SubmitReceipt, GatewayError>;

    async fn poll_status(&self, job_id: &str) -> Result<JobSnapshot, GatewayError>;

    async fn fetch_result(&self, job_id: &str) -> Result<JobOutcome, GatewayError>;
}
