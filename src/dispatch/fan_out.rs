//! Positional correlation of remote results back to their requests.

use crate::batch::PendingRequest;
use crate::error::DispatchError;
use crate::types::ItemResult;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Requests with no result at their position.
    pub missing: usize,
    /// Results with no request at their position; ignored.
    pub surplus: usize,
}

impl FanOutSummary {
    pub fn delivered(&self) -> usize {
        self.succeeded + self.failed + self.missing
    }
}

/// Resolve `items[i]` with `results[i]`.
pub fn fan_out(results: Vec<ItemResult>, items: Vec<PendingRequest>) -> FanOutSummary {
    let mut summary = FanOutSummary::default();
    let expected = items.len();
    let received = results.len();
    if received != expected {
        warn!(expected, received, "result count does not match batch size");
    }

    let mut results = results.into_iter();
    for (index, request) in items.into_iter().enumerate() {
        match results.next() {
            Some(result) if result.success => {
                summary.succeeded += 1;
                request.succeed(result.into());
            }
            Some(result) => {
                summary.failed += 1;
                let message = result
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "unknown error".to_string());
                request.fail(DispatchError::ItemFailed(message));
            }
            None => {
                summary.missing += 1;
                request.fail(DispatchError::MissingResult { index });
            }
        }
    }
    summary.surplus = results.count();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ItemOutcome;
    use crate::types::ItemPayload;
    use tokio::sync::oneshot;

    fn requests(n: usize) -> (Vec<PendingRequest>, Vec<oneshot::Receiver<ItemOutcome>>) {
        (0..n)
            .map(|i| PendingRequest::with_channel(ItemPayload::from_bytes(format!("{}.png", i), vec![0])))
            .unzip()
    }

    #[tokio::test]
    async fn test_results_follow_position() {
        let (items, rxs) = requests(3);
        let summary = fan_out(
            vec![ItemResult::ok("first"), ItemResult::failed("blurry"), ItemResult::ok("third")],
            items,
        );
        assert_eq!(summary, FanOutSummary { succeeded: 2, failed: 1, missing: 0, surplus: 0 });

        let mut outcomes = Vec::new();
        for rx in rxs {
            outcomes.push(rx.await.unwrap());
        }
        assert_eq!(outcomes[0].as_ref().unwrap().question_text, "first");
        assert_eq!(outcomes[1], Err(DispatchError::ItemFailed("blurry".into())));
        assert_eq!(outcomes[2].as_ref().unwrap().question_text, "third");
    }

    #[tokio::test]
    async fn test_short_list_marks_tail_missing() {
        let (items, mut rxs) = requests(3);
        let summary = fan_out(vec![ItemResult::ok("only")], items);
        assert_eq!(summary.missing, 2);
        assert_eq!(summary.delivered(), 3);
        let last = rxs.pop().unwrap().await.unwrap();
        assert_eq!(last, Err(DispatchError::MissingResult { index: 2 }));
    }

    #[test]
    fn test_surplus_ignored_and_blank_error_defaulted() {
        let (items, mut rxs) = requests(1);
        let summary = fan_out(
            vec![
                ItemResult { success: false, error: Some(" ".into()), ..Default::default() },
                ItemResult::ok("extra"),
            ],
            items,
        );
        assert_eq!(summary.surplus, 1);
        assert_eq!(
            rxs.remove(0).try_recv().unwrap(),
            Err(DispatchError::ItemFailed("unknown error".into()))
        );
    }
}
