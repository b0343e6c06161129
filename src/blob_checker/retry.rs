use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Linear backoff: attempt `n` (0-based) waits `n * unit` before running.
pub fn linear_backoff(unit: Duration) -> impl Fn(u32) -> Duration {
    move |attempt| unit * attempt
}

/// Runs `operation` up to `attempts` times, sleeping `backoff(attempt)` before
/// each attempt, until it succeeds. Returns the last error once attempts are
/// exhausted. At least one attempt is always made.
pub async fn retry_with_backoff<T, E, B, F, Fut>(
    attempts: u32,
    backoff: B,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    B: Fn(u32) -> Duration,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        let delay = backoff(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt + 1 < attempts => {
                debug!("Attempt {}/{attempts} failed: {error}", attempt + 1);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_linear_backoff() {
        let backoff = linear_backoff(Duration::from_secs(1));

        let delays: Vec<_> = (0..5).map(&backoff).collect();
        assert_eq!(
            delays,
            [0, 1, 2, 3, 4].map(Duration::from_secs).to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_attempt_without_delay() {
        let start = Instant::now();

        let result: Result<u32, String> =
            retry_with_backoff(5, linear_backoff(Duration::from_secs(1)), |attempt| async move {
                Ok(attempt)
            })
            .await;

        assert_eq!(result, Ok(0));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<&str, String> =
            retry_with_backoff(5, linear_backoff(Duration::from_secs(1)), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(format!("failure {attempt}"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 0s + 1s + 2s
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), String> =
            retry_with_backoff(5, linear_backoff(Duration::from_secs(1)), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {attempt}")) }
            })
            .await;

        assert_eq!(result, Err("failure 4".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_backoff(0, |_| Duration::ZERO, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
