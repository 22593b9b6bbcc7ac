//! Long-poll loop shared by every "wait for something new" call.
//!
//! The loop arms the user's wait handle, reads, and only then parks. A wake
//! that lands between the read and the park is therefore still observed. The
//! park itself is capped at a slice so a lost wake costs at most one slice of
//! latency.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::broker::Broker;

/// Longest single park between two reads.
pub const DEFAULT_SLICE: Duration = Duration::from_secs(5);

/// Call `read` until it yields a non-empty batch or `timeout` elapses.
///
/// The first read happens immediately, so a zero timeout is a plain check.
/// Returns an empty batch on timeout; read errors end the poll.
pub async fn poll_until<T, E, F, Fut>(
    broker: &Broker,
    user_id: i64,
    timeout: Duration,
    slice: Duration,
    mut read: F,
) -> Result<Vec<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    let handle = broker.handle(user_id);

    loop {
        let notified = handle.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = read().await?;
        if !batch.is_empty() {
            return Ok(batch);
        }

        let now = Instant::now();
        if now >= deadline {
            debug!("long-poll for user {} timed out", user_id);
            return Ok(Vec::new());
        }

        let park = (deadline - now).min(slice);
        let _ = tokio::time::timeout(park, notified).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_returns_pending_data_without_parking() {
        let broker = Broker::new();
        let reads = AtomicUsize::new(0);

        let started = std::time::Instant::now();
        let got = poll_until(&broker, 1, Duration::from_secs(10), DEFAULT_SLICE, || {
            reads.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Infallible>(vec![42]) }
        })
        .await
        .unwrap();

        assert_eq!(got, vec![42]);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_times_out_with_empty_batch() {
        let broker = Broker::new();
        let started = std::time::Instant::now();
        let timeout = Duration::from_millis(80);
        let got: Vec<u8> = poll_until(&broker, 1, timeout, DEFAULT_SLICE, || async {
            Ok::<_, Infallible>(Vec::new())
        })
        .await
        .unwrap();

        assert!(got.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_zero_timeout_reads_once() {
        let broker = Broker::new();
        let reads = AtomicUsize::new(0);
        let got: Vec<u8> = poll_until(&broker, 1, Duration::ZERO, DEFAULT_SLICE, || {
            reads.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Infallible>(Vec::new()) }
        })
        .await
        .unwrap();

        assert!(got.is_empty());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wake_ends_the_wait_early() {
        let broker = Broker::new();
        let log: Arc<Mutex<Vec<i64>>> = Arc::default();

        let producer = {
            let broker = broker.clone();
            let log = log.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                log.lock().unwrap().push(99);
                broker.wake(1);
            })
        };

        let started = std::time::Instant::now();
        let got = poll_until(&broker, 1, Duration::from_secs(20), Duration::from_secs(10), || {
            let snapshot = log.lock().unwrap().clone();
            async move { Ok::<_, Infallible>(snapshot) }
        })
        .await
        .unwrap();
        producer.await.unwrap();

        assert_eq!(got, vec![99]);
        // Well under the 10s slice: the wake, not the slice, ended the park.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_slice_bounds_a_missed_wake() {
        let broker = Broker::new();
        let reads = AtomicUsize::new(0);

        // Data shows up on the third read without any wake being sent.
        let got = poll_until(&broker, 1, Duration::from_secs(5), Duration::from_millis(20), || {
            let n = reads.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Infallible>(if n >= 2 { vec![n] } else { Vec::new() }) }
        })
        .await
        .unwrap();

        assert_eq!(got, vec![2]);
    }

    #[tokio::test]
    async fn test_read_error_ends_the_poll() {
        let broker = Broker::new();
        let timeout = Duration::from_secs(5);
        let got: Result<Vec<u8>, &str> =
            poll_until(&broker, 1, timeout, DEFAULT_SLICE, || async { Err("db down") }).await;
        assert_eq!(got, Err("db down"));
    }
}
