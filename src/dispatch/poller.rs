//! Adaptive status polling for one remote job.
//!
//! | Last answer | Next delay |
//! |-------------|------------|
//! | `pending` | `min(pending_base + pending_step * attempts, pending_cap)`, stall counter reset |
//! | `processing`, completed count grew | `progress_delay`, stall counter reset |
//! | `processing`, no growth | `min(stall_base + stall_step * stalls, stall_cap)` |
//! | poll failed | `min(previous * failure_factor, failure_cap)` |

use crate::error::DispatchError;
use crate::transport::JobGateway;
use crate::types::{ItemResult, JobStatus, RemoteJob};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Upper bound on status polls per job, failed polls included.
    pub max_polls: u32,
    pub pending_base_ms: u64,
    pub pending_step_ms: u64,
    pub pending_cap_ms: u64,
    pub progress_delay_ms: u64,
    pub stall_base_ms: u64,
    pub stall_step_ms: u64,
    pub stall_cap_ms: u64,
    pub failure_factor: f64,
    pub failure_cap_ms: u64,
    /// "Previous delay" assumed when the very first poll fails.
    pub initial_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_polls: 600,
            pending_base_ms: 5000,
            pending_step_ms: 500,
            pending_cap_ms: 10_000,
            progress_delay_ms: 3000,
            stall_base_ms: 3000,
            stall_step_ms: 1000,
            stall_cap_ms: 15_000,
            failure_factor: 1.5,
            failure_cap_ms: 30_000,
            initial_delay_ms: 3000,
        }
    }
}

/// Delay state machine fed with every poll answer.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    config: PollConfig,
    stalls: u32,
    last_completed: u32,
    last_delay: Duration,
}

impl PollSchedule {
    pub fn new(config: PollConfig) -> Self {
        let last_delay = Duration::from_millis(config.initial_delay_ms);
        Self {
            config,
            stalls: 0,
            last_completed: 0,
            last_delay,
        }
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn last_delay(&self) -> Duration {
        self.last_delay
    }

    /// Delay after a successful, non-terminal poll of `job`. `polls` counts
    /// every attempt so far, failed ones included.
    pub fn on_status(&mut self, job: &RemoteJob, polls: u32) -> Duration {
        let c = &self.config;
        let ms = match job.status {
            JobStatus::Processing if job.progress.completed > self.last_completed => {
                self.stalls = 0;
                c.progress_delay_ms
            }
            JobStatus::Processing => {
                self.stalls += 1;
                c.stall_base_ms
                    .saturating_add(c.stall_step_ms.saturating_mul(self.stalls as u64))
                    .min(c.stall_cap_ms)
            }
            _ => {
                self.stalls = 0;
                c.pending_base_ms
                    .saturating_add(c.pending_step_ms.saturating_mul(polls as u64))
                    .min(c.pending_cap_ms)
            }
        };
        self.last_completed = self.last_completed.max(job.progress.completed);
        self.last_delay = Duration::from_millis(ms);
        self.last_delay
    }

    /// Delay after a failed poll.
    pub fn on_failure(&mut self) -> Duration {
        let next = self.last_delay.as_millis() as f64 * self.config.failure_factor;
        let ms = (next as u64).min(self.config.failure_cap_ms);
        self.last_delay = Duration::from_millis(ms);
        self.last_delay
    }
}

/// Poll `job` until it turns terminal or the ceiling is reached.
///
/// Returns the per-item result list of a completed job; any other end is
/// the error every item of the batch receives.
pub async fn poll_until_terminal(
    gateway: &dyn JobGateway,
    job: &mut RemoteJob,
    config: &PollConfig,
) -> Result<Vec<ItemResult>, DispatchError> {
    let mut schedule = PollSchedule::new(config.clone());
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let delay = match gateway.poll_status(&job.id).await {
            Ok(snapshot) => {
                if job.observe(&snapshot) {
                    warn!(job = %job.id, completed = snapshot.progress.completed, "progress went backwards, keeping previous value");
                }
                match snapshot.status {
                    JobStatus::Completed => return fetch_completed(gateway, job).await,
                    JobStatus::Failed => return Err(remote_failure(gateway, job).await),
                    JobStatus::Pending | JobStatus::Processing => {
                        let delay = schedule.on_status(job, attempts);
                        log_progress(job, &schedule, delay);
                        delay
                    }
                }
            }
            Err(err) => {
                let delay = schedule.on_failure();
                warn!(job = %job.id, poll = attempts, delay_ms = delay.as_millis() as u64, error = %err, "status poll failed");
                delay
            }
        };
        if attempts >= config.max_polls {
            warn!(job = %job.id, polls = attempts, status = %job.status, "poll ceiling reached");
            return Err(DispatchError::PollingTimeout { polls: attempts });
        }
        tokio::time::sleep(delay).await;
    }
}

async fn fetch_completed(
    gateway: &dyn JobGateway,
    job: &RemoteJob,
) -> Result<Vec<ItemResult>, DispatchError> {
    let outcome = gateway.fetch_result(&job.id).await?;
    match outcome.items {
        Some(items) if outcome.success => {
            debug!(job = %job.id, results = items.len(), "results fetched");
            Ok(items)
        }
        _ => Err(DispatchError::ResultUnavailable(
            outcome
                .error
                .unwrap_or_else(|| "gateway returned no results".to_string()),
        )),
    }
}

/// The result endpoint usually carries the reason; failing to read it is
/// not an error of its own.
async fn remote_failure(gateway: &dyn JobGateway, job: &RemoteJob) -> DispatchError {
    let message = match gateway.fetch_result(&job.id).await {
        Ok(outcome) => outcome.error,
        Err(err) => {
            debug!(job = %job.id, error = %err, "could not fetch failure details");
            None
        }
    };
    DispatchError::RemoteJobFailed(message.unwrap_or_else(|| "no error message".to_string()))
}

fn log_progress(job: &RemoteJob, schedule: &PollSchedule, delay: Duration) {
    let p = job.progress;
    let progressing = job.status == JobStatus::Processing && schedule.stalls() == 0;
    let every = if progressing { 10 } else { 5 };
    if job.polls % every == 0 {
        info!(
            job = %job.id,
            status = %job.status,
            poll = job.polls,
            completed = p.completed,
            failed = p.failed,
            total = p.total,
            percent = p.percentage(),
            "job progress"
        );
    } else {
        debug!(job = %job.id, status = %job.status, poll = job.polls, delay_ms = delay.as_millis() as u64, "job polled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobProgress, JobSnapshot};

    fn job_after(status: JobStatus, completed: u32, polls: u32) -> RemoteJob {
        let mut job = RemoteJob::new("job", 10);
        for _ in 0..polls {
            job.observe(&JobSnapshot::new(status, JobProgress::new(10, completed, 0)));
        }
        job
    }

    #[test]
    fn test_pending_delay_grows_to_cap() {
        let mut s = PollSchedule::new(PollConfig::default());
        assert_eq!(s.on_status(&job_after(JobStatus::Pending, 0, 1), 1), Duration::from_millis(5500));
        assert_eq!(s.on_status(&job_after(JobStatus::Pending, 0, 4), 4), Duration::from_millis(7000));
        assert_eq!(s.on_status(&job_after(JobStatus::Pending, 0, 30), 30), Duration::from_secs(10));
    }

    #[test]
    fn test_pending_delay_counts_failed_attempts() {
        let mut s = PollSchedule::new(PollConfig::default());
        s.on_failure();
        s.on_failure();
        // Third attempt is the first successful one.
        let job = job_after(JobStatus::Pending, 0, 1);
        assert_eq!(s.on_status(&job, 3), Duration::from_millis(6500));
    }

    #[test]
    fn test_processing_progress_and_stalls() {
        let mut s = PollSchedule::new(PollConfig::default());
        let mut job = RemoteJob::new("job", 10);
        let poll = |job: &mut RemoteJob, s: &mut PollSchedule, completed| {
            job.observe(&JobSnapshot::new(JobStatus::Processing, JobProgress::new(10, completed, 0)));
            let polls = job.polls;
            s.on_status(job, polls)
        };

        assert_eq!(poll(&mut job, &mut s, 2), Duration::from_secs(3));
        assert_eq!(poll(&mut job, &mut s, 2), Duration::from_secs(4));
        assert_eq!(poll(&mut job, &mut s, 2), Duration::from_secs(5));
        assert_eq!(s.stalls(), 2);
        assert_eq!(poll(&mut job, &mut s, 3), Duration::from_secs(3));
        assert_eq!(s.stalls(), 0);

        for _ in 0..20 {
            poll(&mut job, &mut s, 3);
        }
        assert_eq!(s.last_delay(), Duration::from_secs(15));
    }

    #[test]
    fn test_failure_backoff() {
        let mut s = PollSchedule::new(PollConfig::default());
        assert_eq!(s.on_failure(), Duration::from_millis(4500));
        assert_eq!(s.on_failure(), Duration::from_millis(6750));
        for _ in 0..10 {
            s.on_failure();
        }
        assert_eq!(s.last_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_failure_after_pending_scales_last_delay() {
        let mut s = PollSchedule::new(PollConfig::default());
        s.on_status(&job_after(JobStatus::Pending, 0, 2), 2);
        assert_eq!(s.last_delay(), Duration::from_secs(6));
        assert_eq!(s.on_failure(), Duration::from_secs(9));
    }

    #[test]
    fn test_pending_answer_breaks_stall_streak() {
        let mut s = PollSchedule::new(PollConfig::default());
        let mut job = RemoteJob::new("job", 10);
        let mut answer = |status, s: &mut PollSchedule| {
            job.observe(&JobSnapshot::new(status, JobProgress::new(10, 0, 0)));
            let polls = job.polls;
            s.on_status(&job, polls)
        };

        for _ in 0..3 {
            answer(JobStatus::Processing, &mut s);
        }
        assert_eq!(s.stalls(), 3);
        answer(JobStatus::Pending, &mut s);
        assert_eq!(s.stalls(), 0);
        assert_eq!(answer(JobStatus::Processing, &mut s), Duration::from_secs(4));
    }
}
