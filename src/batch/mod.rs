//! 批量收集模块：缓冲待识别题目并按数量或时长切分成批次。
//!
//! # Batch Accumulation Module
//!
//! Incoming items are buffered until either the active batch size is reached
//! or the oldest buffered item has waited longer than the stale window.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`PendingRequest`] | One item plus its one-shot success/error callbacks |
//! | [`BatchAccumulator`] | Thread-safe buffer with size-based hand-over |
//! | [`BatchSizeConfig`] | Small/large sizes, load threshold, stale window |
//! | [`Batch`] | Ordered group of requests taken out in one flush |
//! | [`FlushTrigger`] | Periodic task flushing stale buffers |
//!
//! ## Example
//!
//! ```rust
//! use question_dispatch::batch::{BatchAccumulator, BatchSizeConfig, PendingRequest, PushOutcome};
//! use question_dispatch::types::ItemPayload;
//!
//! let acc = BatchAccumulator::new(BatchSizeConfig::new().with_sizes(2, 4));
//! let item = |name: &str| {
//!     PendingRequest::new(ItemPayload::from_bytes(name, vec![0u8]), |_| {}, |_| {})
//! };
//!
//! assert!(!acc.push(item("a.png")).is_full());
//! match acc.push(item("b.png")) {
//!     PushOutcome::Full(batch) => assert_eq!(batch.len(), 2),
//!     PushOutcome::Buffered { .. } => unreachable!(),
//! }
//! ```
//!
//! ## Sizing
//!
//! [`BatchAccumulator::adjust_concurrency`] picks the large size once the load
//! hint reaches the threshold. A buffer keeps the size that was active when
//! its first item arrived.

mod collector;
mod request;
mod trigger;

pub use collector::{Batch, BatchAccumulator, BatchSizeConfig, PushOutcome, SizingSnapshot};
pub use request::{ItemOutcome, PendingRequest};
pub use trigger::FlushTrigger;
