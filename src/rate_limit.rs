use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Fixed-window counter for one logical resource (e.g. `function_analyze-mood`).
#[derive(Debug, Clone, Copy)]
struct RateLimitWindow {
    count: u32,
    reset_at: Instant,
}

impl RateLimitWindow {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug)]
struct LimiterState {
    windows: HashMap<String, RateLimitWindow>,
    last_sweep: Instant,
}

/// Per-key fixed-window rate limiter.
///
/// A key's window starts on its first call and lasts `window`; at most
/// `max_requests` calls are allowed inside it. Rejected calls do not count.
/// Expired windows are swept lazily, at most once per `sweep_interval`, so
/// memory stays bounded under many distinct keys.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    sweep_interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            sweep_interval: Duration::from_secs(300),
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call against `key` if the window allows it.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut state = self.lock();

        if now.saturating_duration_since(state.last_sweep) >= self.sweep_interval {
            state.windows.retain(|_, w| !w.is_expired(now));
            state.last_sweep = now;
        }

        if let Some(window) = state.windows.get_mut(key)
            && !window.is_expired(now)
        {
            if window.count >= self.max_requests {
                let retry_after = window.reset_at.saturating_duration_since(now);
                tracing::debug!(key, ?retry_after, "Rate limit reached");
                return RateLimitDecision::Limited { retry_after };
            }
            window.count += 1;
            return RateLimitDecision::Allowed {
                remaining: self.max_requests - window.count,
            };
        }

        state.windows.insert(
            key.to_string(),
            RateLimitWindow {
                count: 1,
                reset_at: now + self.window,
            },
        );
        RateLimitDecision::Allowed {
            remaining: self.max_requests.saturating_sub(1),
        }
    }

    /// Boolean form of [`check`](Self::check).
    pub fn check_rate_limit(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    /// Calls still available for `key` in its current window.
    pub fn remaining_requests(&self, key: &str) -> u32 {
        let now = Instant::now();
        self.lock()
            .windows
            .get(key)
            .filter(|w| !w.is_expired(now))
            .map_or(self.max_requests, |w| {
                self.max_requests.saturating_sub(w.count)
            })
    }

    /// Time until the current window for `key` resets; zero when no window is open.
    pub fn time_until_reset(&self, key: &str) -> Duration {
        let now = Instant::now();
        self.lock()
            .windows
            .get(key)
            .map_or(Duration::ZERO, |w| w.reset_at.saturating_duration_since(now))
    }

    /// Drop every expired window now.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.windows.len();
        state.windows.retain(|_, w| !w.is_expired(now));
        state.last_sweep = now;
        before - state.windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().windows.len()
    }
}

/// Human-readable wait text, e.g. `"1m 5s"` or `"12s"`.
pub fn format_wait(duration: Duration) -> String {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
