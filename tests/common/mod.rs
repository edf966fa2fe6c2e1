//! Scripted in-memory gateway for dispatcher integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use question_dispatch::types::{
    ItemPayload, ItemResult, JobOutcome, JobProgress, JobSnapshot, JobStatus, SubmitReceipt,
};
use question_dispatch::{DispatcherConfig, GatewayError, ItemOutcome, JobGateway};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// One `submit_batch` call as the gateway saw it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub at: Instant,
    pub filenames: Vec<String>,
    pub hint: usize,
    pub accepted: bool,
}

/// Gateway whose answers are queued up front.
///
/// - submit: scripted errors first, then accepted as `job-<n>`
/// - status: scripted snapshots first, then `completed`
/// - result: one entry per submitted file; names containing `bad` fail
#[derive(Default)]
pub struct ScriptedGateway {
    submit_errors: Mutex<VecDeque<GatewayError>>,
    statuses: Mutex<VecDeque<Result<JobSnapshot, GatewayError>>>,
    result_override: Mutex<Option<Result<JobOutcome, GatewayError>>>,
    result_limit: Mutex<Option<usize>>,
    jobs: Mutex<HashMap<String, Vec<String>>>,
    submissions: Mutex<Vec<Submission>>,
    polls: Mutex<Vec<Instant>>,
    next_job: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_submits(self, errors: Vec<GatewayError>) -> Self {
        self.submit_errors.lock().unwrap().extend(errors);
        self
    }

    pub fn with_statuses(self, statuses: Vec<Result<JobSnapshot, GatewayError>>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn with_result(self, outcome: Result<JobOutcome, GatewayError>) -> Self {
        *self.result_override.lock().unwrap() = Some(outcome);
        self
    }

    /// Return at most `n` results per job.
    pub fn truncate_results(self, n: usize) -> Self {
        *self.result_limit.lock().unwrap() = Some(n);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn accepted_batches(&self) -> Vec<Vec<String>> {
        self.submissions()
            .into_iter()
            .filter(|s| s.accepted)
            .map(|s| s.filenames)
            .collect()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobGateway for ScriptedGateway {
    async fn submit_batch(
        &self,
        items: &[ItemPayload],
        concurrency_hint: usize,
    ) -> Result<SubmitReceipt, GatewayError> {
        let filenames: Vec<String> = items.iter().map(|p| p.filename.clone()).collect();
        let scripted = self.submit_errors.lock().unwrap().pop_front();
        self.submissions.lock().unwrap().push(Submission {
            at: Instant::now(),
            filenames: filenames.clone(),
            hint: concurrency_hint,
            accepted: scripted.is_none(),
        });
        if let Some(err) = scripted {
            return Err(err);
        }
        let id = format!("job-{}", self.next_job.fetch_add(1, Ordering::SeqCst) + 1);
        self.jobs.lock().unwrap().insert(id.clone(), filenames);
        Ok(SubmitReceipt {
            job_id: id,
            message: None,
        })
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobSnapshot, GatewayError> {
        self.polls.lock().unwrap().push(Instant::now());
        if let Some(next) = self.statuses.lock().unwrap().pop_front() {
            return next;
        }
        let total = self
            .jobs
            .lock()
            .unwrap()
            .get(job_id)
            .map(|f| f.len() as u32)
            .unwrap_or(0);
        Ok(JobSnapshot::new(
            JobStatus::Completed,
            JobProgress::new(total, total, 0),
        ))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<JobOutcome, GatewayError> {
        if let Some(outcome) = self.result_override.lock().unwrap().clone() {
            return outcome;
        }
        let files = self.jobs.lock().unwrap().get(job_id).cloned().unwrap_or_default();
        let limit = self.result_limit.lock().unwrap().unwrap_or(usize::MAX);
        let items = files
            .iter()
            .take(limit)
            .map(|name| {
                if name.contains("bad") {
                    ItemResult::failed(format!("cannot read {}", name))
                } else {
                    ItemResult::ok(format!("question from {}", name))
                }
            })
            .collect();
        Ok(JobOutcome::completed(items))
    }
}

pub fn payload(name: &str) -> ItemPayload {
    ItemPayload::from_bytes(name, name.as_bytes().to_vec())
}

pub fn snapshot(status: JobStatus, completed: u32) -> Result<JobSnapshot, GatewayError> {
    Ok(JobSnapshot::new(status, JobProgress::new(10, completed, 0)))
}

pub fn config(small: usize, large: usize) -> DispatcherConfig {
    let mut config = DispatcherConfig::default();
    config.batch.small_size = small;
    config.batch.large_size = large;
    config
}

pub async fn collect(receivers: Vec<oneshot::Receiver<ItemOutcome>>) -> Vec<ItemOutcome> {
    let mut out = Vec::with_capacity(receivers.len());
    for rx in receivers {
        out.push(rx.await.expect("request resolved"));
    }
    out
}
