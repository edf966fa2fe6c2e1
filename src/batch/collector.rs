//! Batch accumulator.

use super::request::PendingRequest;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSizeConfig {
    /// Batch size under light load.
    pub small_size: usize,
    /// Batch size once the load hint reaches `size_threshold`.
    pub large_size: usize,
    pub size_threshold: usize,
    /// A non-empty buffer older than this is flushed even if not full.
    pub stale_after_ms: u64,
}

impl Default for BatchSizeConfig {
    fn default() -> Self {
        Self {
            small_size: 10,
            large_size: 20,
            size_threshold: 20,
            stale_after_ms: 2000,
        }
    }
}

impl BatchSizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sizes(mut self, small: usize, large: usize) -> Self {
        self.small_size = small;
        self.large_size = large;
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.size_threshold = threshold;
        self
    }

    pub fn with_stale_after(mut self, stale: Duration) -> Self {
        self.stale_after_ms = stale.as_millis() as u64;
        self
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn size_for_load(&self, load_hint: usize) -> usize {
        if load_hint >= self.size_threshold {
            self.large_size
        } else {
            self.small_size
        }
    }
}

/// Tunables and the size currently in effect, published as one value so a
/// reader never sees a half-applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingSnapshot {
    pub config: BatchSizeConfig,
    pub active_size: usize,
}

/// An ordered group of requests taken out of the buffer in one flush.
///
/// Item order is the correlation key for remote results and never changes
/// after the flush.
#[derive(Debug)]
pub struct Batch {
    seq: u64,
    created_at: Instant,
    target_size: usize,
    items: Vec<PendingRequest>,
}

impl Batch {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// When the first item entered the buffer.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Size in effect when this batch started filling.
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PendingRequest] {
        &self.items
    }

    pub fn into_items(self) -> Vec<PendingRequest> {
        self.items
    }
}

#[derive(Debug)]
pub enum PushOutcome {
    /// Buffered; `count` items now waiting out of `target`.
    Buffered { count: usize, target: usize },
    /// The push filled the buffer; the caller owns the batch.
    Full(Batch),
}

impl PushOutcome {
    pub fn is_full(&self) -> bool {
        matches!(self, PushOutcome::Full(_))
    }
}

#[derive(Debug)]
struct Buffer {
    items: Vec<PendingRequest>,
    created_at: Option<Instant>,
    target_size: usize,
}

/// Lock-protected buffer with copy-out-under-lock semantics: every method
/// that returns a [`Batch`] has already replaced the buffer with an empty
/// one, so the same contents can never be dispatched twice.
pub struct BatchAccumulator {
    sizing: ArcSwap<SizingSnapshot>,
    buffer: Mutex<Buffer>,
    next_seq: AtomicU64,
}

impl BatchAccumulator {
    pub fn new(config: BatchSizeConfig) -> Self {
        let active_size = config.small_size.max(1);
        Self {
            sizing: ArcSwap::from_pointee(SizingSnapshot {
                config,
                active_size,
            }),
            buffer: Mutex::new(Buffer {
                items: Vec::new(),
                created_at: None,
                target_size: active_size,
            }),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn sizing(&self) -> Arc<SizingSnapshot> {
        self.sizing.load_full()
    }

    pub fn active_size(&self) -> usize {
        self.sizing.load().active_size
    }

    pub fn stale_after(&self) -> Duration {
        self.sizing.load().config.stale_after()
    }

    /// Pick the batch size for the given load hint. Applies to batches that
    /// start filling after this call; returns the new active size.
    pub fn adjust_concurrency(&self, load_hint: usize) -> usize {
        let previous = self.sizing.rcu(|current| {
            let mut next = SizingSnapshot::clone(current);
            next.active_size = current.config.size_for_load(load_hint).max(1);
            next
        });
        let active = self.active_size();
        if previous.active_size != active {
            info!(
                from = previous.active_size,
                to = active,
                load_hint,
                "batch size adjusted"
            );
        }
        active
    }

    /// Append a request. Never blocks on anything but the buffer lock.
    pub fn push(&self, request: PendingRequest) -> PushOutcome {
        let mut buf = self.lock();
        if buf.items.is_empty() {
            buf.created_at = Some(Instant::now());
            buf.target_size = self.active_size();
        }
        buf.items.push(request);
        let count = buf.items.len();
        let target = buf.target_size;
        if count >= target {
            match self.take_locked(&mut buf) {
                Some(batch) => PushOutcome::Full(batch),
                None => PushOutcome::Buffered { count: 0, target },
            }
        } else {
            PushOutcome::Buffered { count, target }
        }
    }

    /// Take the buffer if it is full or has gone stale by `now`.
    pub fn take_if_due(&self, now: Instant) -> Option<Batch> {
        let stale_after = self.stale_after();
        let mut buf = self.lock();
        let count = buf.items.len();
        if count == 0 {
            return None;
        }
        let elapsed = buf
            .created_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();
        let due = count >= buf.target_size || elapsed >= stale_after;
        debug!(
            buffered = count,
            target = buf.target_size,
            elapsed_ms = elapsed.as_millis() as u64,
            due,
            "flush check"
        );
        if due {
            self.take_locked(&mut buf)
        } else {
            None
        }
    }

    /// Take whatever is buffered; `None` if empty.
    pub fn take_all(&self) -> Option<Batch> {
        let mut buf = self.lock();
        self.take_locked(&mut buf)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Age of the oldest buffered item.
    pub fn oldest_age(&self, now: Instant) -> Option<Duration> {
        self.lock()
            .created_at
            .map(|t| now.saturating_duration_since(t))
    }

    fn take_locked(&self, buf: &mut Buffer) -> Option<Batch> {
        if buf.items.is_empty() {
            return None;
        }
        let items = std::mem::take(&mut buf.items);
        let created_at = buf.created_at.take().unwrap_or_else(Instant::now);
        Some(Batch {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            created_at,
            target_size: buf.target_size,
            items,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // Buffer state stays consistent even if a holder panicked.
        self.buffer.lock().unwrap_or_else(|p| p.into_inner())
    }
}
