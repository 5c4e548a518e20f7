use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exponential backoff schedule: attempt `n` (zero-based) waits
/// `base_delay * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before the retry that follows failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Runs a fallible async operation under a [`RetryPolicy`].
///
/// Which errors are worth retrying is decided by the caller through the
/// `is_retryable` predicate. Dropping the returned future cancels the run;
/// an attached [`CancellationToken`] additionally interrupts a pending
/// backoff sleep, in which case the last failure is returned.
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(label, attempt, "Operation recovered after retries");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let remaining = self.policy.max_attempts.saturating_sub(attempt + 1);
                    if remaining == 0 || !is_retryable(&err) {
                        if remaining > 0 {
                            tracing::debug!(label, "Non-retryable error: {err}");
                        } else {
                            tracing::warn!(
                                label,
                                attempts = attempt + 1,
                                "Retries exhausted: {err}"
                            );
                        }
                        return Err(err);
                    }

                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        label,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Operation failed, retrying: {err}"
                    );

                    if let Some(token) = &self.cancel {
                        tokio::select! {
                            () = token.cancelled() => {
                                tracing::debug!(label, "Retry abandoned by caller");
                                return Err(err);
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Convenience wrapper for a one-off retry without building a [`Retrier`].
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: P,
    op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    Retrier::new(policy).run(label, is_retryable, op).await
}
