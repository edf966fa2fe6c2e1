//! 弹性模块：批次提交的重试策略。
//!
//! # Resilience Module
//!
//! Submissions are retried narrowly: only a transport timeout earns another
//! attempt, with a linearly increasing delay. Status polling has its own
//! backoff in [`crate::dispatch`] and does not go through this module.
//!
//! ```rust
//! use question_dispatch::resilience::{ResiliencePolicy, RetryConfig, TimeoutRetry};
//! use question_dispatch::transport::GatewayError;
//! use std::time::Duration;
//!
//! let policy = TimeoutRetry::new(RetryConfig::default());
//! let timeout = GatewayError::Timeout("read timed out".into());
//! assert_eq!(policy.should_retry(1, &timeout), Some(Duration::from_secs(2)));
//! assert_eq!(policy.should_retry(2, &timeout), None);
//! ```

pub mod retry;

pub use retry::{retry_with, ResiliencePolicy, RetryConfig, TimeoutRetry};
