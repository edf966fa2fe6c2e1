//! 调度模块：提交批次、轮询远端任务并将结果回传给每个请求。
//!
//! # Dispatch Module
//!
//! Every flushed batch runs on its own task:
//!
//! 1. payloads are loaded in order; unreadable items fail immediately
//! 2. the batch is submitted, retrying transport timeouts only
//! 3. the remote job is polled with an adaptive delay until terminal
//! 4. results are matched to requests by position
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Dispatcher`] | Caller-facing entry point |
//! | [`DispatcherBuilder`] | Gateway, config and runtime wiring |
//! | [`JobPipeline`] | Load → submit → poll → fan-out for one batch |
//! | [`PollSchedule`] | Delay state machine between status polls |
//! | [`fan_out`] | Positional correlation of results |
//! | [`SignalsSnapshot`] | Buffered and in-flight counts |

mod builder;
mod core;
mod fan_out;
mod pipeline;
mod poller;
mod signals;

pub use builder::DispatcherBuilder;
pub use self::core::Dispatcher;
pub use fan_out::{fan_out, FanOutSummary};
pub use pipeline::{InflightGuard, JobPipeline};
pub use poller::{poll_until_terminal, PollConfig, PollSchedule};
pub use signals::SignalsSnapshot;
