use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a bounded backend call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut(Duration),
    Cancelled,
}

/// Runs `future` until it completes, `limit` elapses, or `cancel` fires.
///
/// Cancellation wins over completion when both are ready on the same poll.
pub async fn bounded<F>(
    future: F,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        outcome = tokio::time::timeout(limit, future) => {
            outcome.map_err(|_| Interrupted::TimedOut(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{bounded, Interrupted};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn completes_within_limit() {
        let cancel = CancellationToken::new();
        let value = bounded(async { 7 }, Duration::from_secs(1), &cancel).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn reports_timeout() {
        let cancel = CancellationToken::new();
        let limit = Duration::from_millis(20);
        let outcome = bounded(
            tokio::time::sleep(Duration::from_secs(5)),
            limit,
            &cancel,
        )
        .await;
        assert_eq!(outcome, Err(Interrupted::TimedOut(limit)));
    }

    #[tokio::test]
    async fn reports_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = bounded(async { 1 }, Duration::from_secs(1), &cancel).await;
        assert_eq!(outcome, Err(Interrupted::Cancelled));
    }
}
