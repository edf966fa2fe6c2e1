//! Periodic flush trigger.

use super::collector::{Batch, BatchAccumulator};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Background task that checks the accumulator every `tick` and hands due
/// batches to `on_flush`.
///
/// Stops when [`FlushTrigger::stop`] is called or the trigger is dropped.
pub struct FlushTrigger {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushTrigger {
    pub fn spawn<F>(
        runtime: &Handle,
        accumulator: Arc<BatchAccumulator>,
        tick: Duration,
        on_flush: F,
    ) -> Self
    where
        F: Fn(Batch) + Send + Sync + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(tick_ms = tick.as_millis() as u64, "flush trigger started");
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        // Err means the sender is gone.
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Some(batch) = accumulator.take_if_due(Instant::now()) {
                            info!(
                                batch = batch.seq(),
                                items = batch.len(),
                                target = batch.target_size(),
                                "flushing batch"
                            );
                            on_flush(batch);
                        }
                    }
                }
            }
            debug!("flush trigger stopped");
        });
        Self { stop_tx, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit. A tick in progress completes
    /// first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}
