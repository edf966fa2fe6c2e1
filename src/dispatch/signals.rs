/// Point-in-time view of a dispatcher's load, for orchestration and logs.
///
/// Facts only; callers build their own policy on top (for example feeding
/// `buffered` back into [`crate::Dispatcher::adjust_concurrency`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalsSnapshot {
    /// Requests waiting in the accumulator.
    pub buffered: usize,
    /// Batch size that the next batch to start filling will use.
    pub active_batch_size: usize,
    /// Batches between flush and final fan-out.
    pub inflight_jobs: usize,
    pub closed: bool,
}

impl SignalsSnapshot {
    pub fn is_idle(&self) -> bool {
        self.buffered == 0 && self.inflight_jobs == 0
    }
}
