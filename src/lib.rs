//! # question-dispatch
//!
//! 题目图片的自适应批量调度器：将零散的识别请求合并成批次，异步提交给远端分析服务，
//! 轮询任务状态，并按位置把结果逐一回传给调用方。
//!
//! Adaptive batching and async job dispatch for scanned question images.
//!
//! ## Overview
//!
//! Callers enqueue single items and get exactly one callback per item. The
//! dispatcher groups items into batches (by size or by age), submits each
//! batch to an analysis backend as one asynchronous job, polls the job with
//! an adaptive delay, and hands `result[i]` back to the caller of item `i`.
//!
//! ## Key Features
//!
//! - **Adaptive batch size**: small batches under light load, large ones once
//!   the caller reports a backlog ([`Dispatcher::adjust_concurrency`])
//! - **Bounded latency**: a stale buffer is flushed by a periodic trigger
//! - **Timeout-only retry**: submissions are retried on transport timeouts only
//! - **Exactly-once callbacks**: every item resolves once, even when dropped
//! - **Pluggable backend**: [`transport::JobGateway`] with an HTTP implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use question_dispatch::{Dispatcher, DispatcherConfig, GatewayConfig, HttpGateway, PayloadSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> question_dispatch::Result<()> {
//!     let gateway = HttpGateway::new(&GatewayConfig::from_env())?;
//!     let dispatcher = Dispatcher::new(Arc::new(gateway), DispatcherConfig::from_env())?;
//!
//!     let outcome = dispatcher.submit(PayloadSource::file("scans/q1.jpg"));
//!     dispatcher.shutdown().await;
//!
//!     match outcome.await {
//!         Ok(Ok(question)) => println!("{}", question.question_text),
//!         Ok(Err(err)) => eprintln!("failed: {}", err),
//!         Err(_) => eprintln!("dispatcher dropped the request"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Request buffering, batch sizing and the flush trigger |
//! | [`dispatch`] | Dispatcher, per-batch pipeline, polling and fan-out |
//! | [`transport`] | Gateway trait and the HTTP gateway |
//! | [`resilience`] | Submission retry policy |
//! | [`types`] | Payloads, job model and normalized results |
//! | [`config`] | Defaults, YAML and environment configuration |

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use batch::{ItemOutcome, PendingRequest};
pub use config::{DispatcherConfig, GatewayConfig};
pub use dispatch::{Dispatcher, DispatcherBuilder, SignalsSnapshot};
pub use transport::{GatewayError, HttpGateway, JobGateway};
pub use types::{ItemPayload, PayloadSource, QuestionContent};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{DispatchError, Error, ErrorContext};
