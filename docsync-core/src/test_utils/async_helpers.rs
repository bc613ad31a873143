//! Async test helpers

use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

/// Receive from an unbounded channel with a timeout
pub async fn recv_timeout<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Run a future with a timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future).await.map_err(|_| TimeoutError::Elapsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    Elapsed,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation timed out")
    }
}

impl std::error::Error for TimeoutError {}

/// Poll `condition` every [`POLL_INTERVAL`] until it holds or `duration`
/// elapses. Returns whether it held.
pub async fn wait_until<F, Fut>(duration: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let polling = async {
        while !condition().await {
            sleep(POLL_INTERVAL).await;
        }
    };
    timeout(duration, polling).await.is_ok()
}

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default timeout duration for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for tests that should fail fast (100ms)
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_recv_timeout_success() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(42).unwrap();
        assert_eq!(recv_timeout(&mut rx, SHORT_TEST_TIMEOUT).await, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_elapsed() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<u8>();
        assert_eq!(
            recv_timeout(&mut rx, SHORT_TEST_TIMEOUT).await,
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_recv_timeout_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        drop(tx);
        assert_eq!(
            recv_timeout(&mut rx, SHORT_TEST_TIMEOUT).await,
            Err(RecvTimeoutError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout() {
        assert_eq!(with_timeout(SHORT_TEST_TIMEOUT, async { 7 }).await, Ok(7));
        let slow = sleep(Duration::from_secs(10));
        assert_eq!(with_timeout(SHORT_TEST_TIMEOUT, slow).await, Err(TimeoutError::Elapsed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let held = wait_until(DEFAULT_TEST_TIMEOUT, || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) >= 3 }
        })
        .await;
        assert!(held);
        assert_eq!(polls.load(Ordering::SeqCst), 4);

        assert!(!wait_until(SHORT_TEST_TIMEOUT, || async { false }).await);
    }
}
