//! A caller's unit of work and its one-shot completion callbacks.

use crate::error::DispatchError;
use crate::types::{PayloadSource, QuestionContent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

pub type ItemOutcome = std::result::Result<QuestionContent, DispatchError>;

type SuccessFn = Box<dyn FnOnce(QuestionContent) + Send + 'static>;
type ErrorFn = Box<dyn FnOnce(DispatchError) + Send + 'static>;

struct Callbacks {
    on_success: SuccessFn,
    on_error: ErrorFn,
}

/// One enqueued item.
///
/// Exactly one of the two callbacks runs, exactly once: [`succeed`] and
/// [`fail`] consume the request, and a request dropped without an outcome
/// reports [`DispatchError::Abandoned`].
///
/// [`succeed`]: PendingRequest::succeed
/// [`fail`]: PendingRequest::fail
pub struct PendingRequest {
    id: Uuid,
    source: PayloadSource,
    enqueued_at: Instant,
    callbacks: Option<Callbacks>,
}

impl PendingRequest {
    pub fn new<S, E>(source: impl Into<PayloadSource>, on_success: S, on_error: E) -> Self
    where
        S: FnOnce(QuestionContent) + Send + 'static,
        E: FnOnce(DispatchError) + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            enqueued_at: Instant::now(),
            callbacks: Some(Callbacks {
                on_success: Box::new(on_success),
                on_error: Box::new(on_error),
            }),
        }
    }

    /// Request whose outcome is delivered through a oneshot channel.
    pub fn with_channel(source: impl Into<PayloadSource>) -> (Self, oneshot::Receiver<ItemOutcome>) {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let tx_err = Arc::clone(&tx);
        let request = Self::new(
            source,
            move |content| send_once(&tx, Ok(content)),
            move |err| send_once(&tx_err, Err(err)),
        );
        (request, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn succeed(mut self, content: QuestionContent) {
        if let Some(cb) = self.callbacks.take() {
            invoke(self.id, move || (cb.on_success)(content));
        }
    }

    pub fn fail(mut self, err: DispatchError) {
        if let Some(cb) = self.callbacks.take() {
            invoke(self.id, move || (cb.on_error)(err));
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if let Some(cb) = self.callbacks.take() {
            warn!(request = %self.id, source = %self.source.label(), "request dropped without outcome");
            invoke(self.id, move || (cb.on_error)(DispatchError::Abandoned));
        }
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("source", &self.source.label())
            .field("resolved", &self.callbacks.is_none())
            .finish()
    }
}

fn send_once(slot: &Mutex<Option<oneshot::Sender<ItemOutcome>>>, outcome: ItemOutcome) {
    let sender = slot.lock().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(sender) = sender {
        // receiver may be gone; nothing left to notify then
        let _ = sender.send(outcome);
    }
}

/// Caller code runs inside dispatcher tasks; a panic there must not unwind
/// into the batch loop.
fn invoke(id: Uuid, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(request = %id, "item callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemPayload, ItemResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn payload() -> ItemPayload {
        ItemPayload::from_bytes("q.png", &b"x"[..])
    }

    #[test]
    fn test_drop_reports_abandoned() {
        let errors = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&errors);
        let req = PendingRequest::new(
            payload(),
            |_| panic!("must not succeed"),
            move |err| {
                assert_eq!(err, DispatchError::Abandoned);
                e.fetch_add(1, Ordering::SeqCst);
            },
        );
        drop(req);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_success_fires_once_and_drop_is_silent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (s, e) = (Arc::clone(&hits), Arc::clone(&hits));
        let req = PendingRequest::new(
            payload(),
            move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                e.fetch_add(100, Ordering::SeqCst);
            },
        );
        req.succeed(ItemResult::ok("1+1").into());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let req = PendingRequest::new(payload(), |_| {}, |_| panic!("caller bug"));
        req.fail(DispatchError::Closed);
    }

    #[tokio::test]
    async fn test_channel_delivery() {
        let (req, rx) = PendingRequest::with_channel(payload());
        req.fail(DispatchError::MissingResult { index: 2 });
        assert_eq!(rx.await.unwrap(), Err(DispatchError::MissingResult { index: 2 }));
    }
}
