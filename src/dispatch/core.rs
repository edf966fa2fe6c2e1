use super::builder::DispatcherBuilder;
use super::pipeline::JobPipeline;
use super::signals::SignalsSnapshot;
use crate::batch::{
    Batch, BatchAccumulator, FlushTrigger, ItemOutcome, PendingRequest, PushOutcome,
};
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::transport::JobGateway;
use crate::types::{PayloadSource, QuestionContent};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

/// Entry point: buffers items, flushes batches, and drives each batch
/// through submission, polling and fan-out on its own task.
///
/// `enqueue` never waits on the network. Dropping the dispatcher stops the
/// flush trigger and dispatches whatever is still buffered; jobs already
/// running finish on their own.
pub struct Dispatcher {
    accumulator: Arc<BatchAccumulator>,
    pipeline: Arc<JobPipeline>,
    runtime: Handle,
    closed: AtomicBool,
    trigger: Mutex<Option<FlushTrigger>>,
}

impl Dispatcher {
    /// Create a dispatcher on the current Tokio runtime.
    pub fn new(gateway: Arc<dyn JobGateway>, config: DispatcherConfig) -> Result<Self> {
        DispatcherBuilder::new().gateway(gateway).config(config).build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub(crate) fn start(
        gateway: Arc<dyn JobGateway>,
        config: DispatcherConfig,
        runtime: Handle,
    ) -> Self {
        let accumulator = Arc::new(BatchAccumulator::new(config.batch.clone()));
        let pipeline = Arc::new(JobPipeline::new(gateway, &config));

        let flush_pipeline = Arc::clone(&pipeline);
        let flush_runtime = runtime.clone();
        let trigger = FlushTrigger::spawn(
            &runtime,
            Arc::clone(&accumulator),
            config.tick_interval(),
            move |batch| spawn_batch(&flush_runtime, &flush_pipeline, batch),
        );
        info!(
            batch_size = accumulator.active_size(),
            stale_ms = config.batch.stale_after_ms,
            tick_ms = config.tick_interval_ms,
            concurrency_hint = config.concurrency_hint,
            "dispatcher started"
        );

        Self {
            accumulator,
            pipeline,
            runtime,
            closed: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
        }
    }

    /// Buffer a request. A full buffer is flushed and dispatched right away.
    pub fn enqueue(&self, request: PendingRequest) {
        if self.is_closed() {
            debug!(request = %request.id(), "enqueue after shutdown");
            request.fail(DispatchError::Closed);
            return;
        }
        match self.accumulator.push(request) {
            PushOutcome::Full(batch) => {
                info!(batch = batch.seq(), items = batch.len(), "batch full");
                self.dispatch(batch);
            }
            PushOutcome::Buffered { count, target } => {
                debug!(buffered = count, target, "request buffered");
                // Raced with shutdown: its final flush may already be done.
                if self.is_closed() {
                    self.flush_now();
                }
            }
        }
    }

    pub fn enqueue_with<S, E>(&self, source: impl Into<PayloadSource>, on_success: S, on_error: E)
    where
        S: FnOnce(QuestionContent) + Send + 'static,
        E: FnOnce(DispatchError) + Send + 'static,
    {
        self.enqueue(PendingRequest::new(source, on_success, on_error));
    }

    /// Enqueue and receive the outcome through a channel.
    pub fn submit(&self, source: impl Into<PayloadSource>) -> oneshot::Receiver<ItemOutcome> {
        let (request, rx) = PendingRequest::with_channel(source);
        self.enqueue(request);
        rx
    }

    /// See [`BatchAccumulator::adjust_concurrency`].
    pub fn adjust_concurrency(&self, load_hint: usize) -> usize {
        self.accumulator.adjust_concurrency(load_hint)
    }

    /// Dispatch the buffer regardless of size or age. `false` if it was
    /// empty.
    pub fn flush_now(&self) -> bool {
        match self.accumulator.take_all() {
            Some(batch) => {
                info!(batch = batch.seq(), items = batch.len(), "manual flush");
                self.dispatch(batch);
                true
            }
            None => false,
        }
    }

    pub fn signals(&self) -> SignalsSnapshot {
        SignalsSnapshot {
            buffered: self.accumulator.len(),
            active_batch_size: self.accumulator.active_size(),
            inflight_jobs: self.pipeline.inflight_count(),
            closed: self.is_closed(),
        }
    }

    /// Live count of batches in flight.
    pub fn inflight(&self) -> watch::Receiver<usize> {
        self.pipeline.inflight()
    }

    /// Resolves once no batch is in flight. Buffered items are not flushed.
    pub async fn wait_idle(&self) {
        let mut rx = self.pipeline.inflight();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop intake, flush the buffer and wait for every in-flight job.
    ///
    /// Running jobs are not cancelled. Later calls only wait.
    pub async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(buffered = self.accumulator.len(), "dispatcher shutting down");
            let trigger = self.lock_trigger().take();
            if let Some(trigger) = trigger {
                trigger.stop().await;
            }
            self.flush_now();
        }
        self.wait_idle().await;
        debug!("dispatcher idle");
    }

    fn dispatch(&self, batch: Batch) {
        spawn_batch(&self.runtime, &self.pipeline, batch);
    }

    fn lock_trigger(&self) -> std::sync::MutexGuard<'_, Option<FlushTrigger>> {
        self.trigger.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the trigger closes its stop channel.
        self.lock_trigger().take();
        if let Some(batch) = self.accumulator.take_all() {
            debug!(batch = batch.seq(), items = batch.len(), "dispatching remainder on drop");
            self.dispatch(batch);
        }
    }
}

fn spawn_batch(runtime: &Handle, pipeline: &Arc<JobPipeline>, batch: Batch) {
    let guard = pipeline.track();
    let pipeline = Arc::clone(pipeline);
    runtime.spawn(async move {
        let _guard = guard;
        pipeline.run_batch(batch).await;
    });
}
