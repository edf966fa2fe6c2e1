//! Per-batch lifecycle: load, submit, poll, fan out.

use super::fan_out::fan_out;
use super::poller::{poll_until_terminal, PollConfig};
use crate::batch::{Batch, PendingRequest};
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::resilience::{retry_with, TimeoutRetry};
use crate::transport::JobGateway;
use crate::types::RemoteJob;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct JobPipeline {
    gateway: Arc<dyn JobGateway>,
    retry: TimeoutRetry,
    poll: PollConfig,
    concurrency_hint: usize,
    inflight: Arc<watch::Sender<usize>>,
}

impl JobPipeline {
    pub fn new(gateway: Arc<dyn JobGateway>, config: &DispatcherConfig) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            gateway,
            retry: TimeoutRetry::new(config.retry.clone()),
            poll: config.poll.clone(),
            concurrency_hint: config.concurrency_hint,
            inflight: Arc::new(tx),
        }
    }

    pub fn inflight(&self) -> watch::Receiver<usize> {
        self.inflight.subscribe()
    }

    pub fn inflight_count(&self) -> usize {
        *self.inflight.borrow()
    }

    /// Count a batch as in flight until the returned guard is dropped.
    /// Taken before the batch task is spawned so idle waits cannot miss it.
    pub fn track(&self) -> InflightGuard {
        InflightGuard::new(Arc::clone(&self.inflight))
    }

    /// Drive one batch to completion. Every item of `batch` receives exactly
    /// one outcome before this returns.
    pub async fn run_batch(&self, batch: Batch) {
        let seq = batch.seq();
        let mut outbound: Vec<PendingRequest> = Vec::with_capacity(batch.len());
        let mut payloads = Vec::with_capacity(batch.len());
        for request in batch.into_items() {
            let source = request.source().clone();
            match source.load().await {
                Ok(payload) => {
                    payloads.push(payload);
                    outbound.push(request);
                }
                Err(err) => {
                    warn!(batch = seq, item = %source.label(), error = %err, "item data unavailable");
                    request.fail(err);
                }
            }
        }
        if outbound.is_empty() {
            debug!(batch = seq, "nothing to submit");
            return;
        }

        let gateway = &self.gateway;
        let items = payloads.as_slice();
        let hint = self.concurrency_hint;
        let submitted = retry_with(&self.retry, move |attempt| {
            debug!(batch = seq, attempt, items = items.len(), "submitting batch");
            gateway.submit_batch(items, hint)
        })
        .await;

        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(err) => {
                error!(batch = seq, items = outbound.len(), class = err.class(), error = %err, "batch submission failed");
                fail_all(outbound, DispatchError::Gateway(err));
                return;
            }
        };
        drop(payloads);

        let mut job = RemoteJob::new(receipt.job_id, outbound.len());
        info!(batch = seq, job = %job.id, items = job.items, "batch submitted");

        match poll_until_terminal(self.gateway.as_ref(), &mut job, &self.poll).await {
            Ok(results) => {
                let summary = fan_out(results, outbound);
                info!(
                    batch = seq,
                    job = %job.id,
                    polls = job.polls,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    missing = summary.missing,
                    surplus = summary.surplus,
                    "job completed"
                );
            }
            Err(err) => {
                error!(batch = seq, job = %job.id, class = err.class(), error = %err, "job failed");
                fail_all(outbound, err);
            }
        }
    }
}

fn fail_all(items: Vec<PendingRequest>, err: DispatchError) {
    for request in items {
        request.fail(err.clone());
    }
}

pub struct InflightGuard {
    counter: Arc<watch::Sender<usize>>,
}

impl InflightGuard {
    fn new(counter: Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self { counter }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait::async_trait]
    impl JobGateway for Unreachable {
        async fn submit_batch(
            &self,
            _items: &[crate::types::ItemPayload],
            _hint: usize,
        ) -> Result<crate::types::SubmitReceipt, crate::transport::GatewayError> {
            Err(crate::transport::GatewayError::Unavailable("down".into()))
        }

        async fn poll_status(
            &self,
            _job_id: &str,
        ) -> Result<crate::types::JobSnapshot, crate::transport::GatewayError> {
            unreachable!()
        }

        async fn fetch_result(
            &self,
            _job_id: &str,
        ) -> Result<crate::types::JobOutcome, crate::transport::GatewayError> {
            unreachable!()
        }
    }

    #[test]
    fn test_inflight_guard_counts() {
        let pipeline = JobPipeline::new(Arc::new(Unreachable), &DispatcherConfig::default());
        let rx = pipeline.inflight();
        let a = pipeline.track();
        let b = pipeline.track();
        assert_eq!(*rx.borrow(), 2);
        drop(a);
        assert_eq!(pipeline.inflight_count(), 1);
        drop(b);
        assert_eq!(*rx.borrow(), 0);
    }
}
