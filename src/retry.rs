use std::future::Future;
use std::time::Duration;

/// Errors opt in to retrying. Absence of a record or a client-side
/// rejection will never succeed on a second attempt, so callers must not
/// mark those retryable.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(400))
    }
}

/// Re-invokes `op` with exponential backoff (`base_delay * 2^attempt`, no
/// jitter) until it succeeds, the error is not retryable, or the attempt
/// budget is spent. The final error is returned unmodified.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.retries || !err.is_retryable() {
                    return Err(err);
                }
                let delay = policy.base_delay.saturating_mul(2u32.saturating_pow(attempt));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
