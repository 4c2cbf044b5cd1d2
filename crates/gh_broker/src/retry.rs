use std::time::Duration;

use http::StatusCode;

/// Upper bound on a server-requested wait.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(15 * 60);

/// Fixed-delay retry schedule. GitHub's `Retry-After` overrides the delay
/// when it asks for longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Server errors, rate limiting and abuse detection are retried; every
    /// other client error is final.
    pub fn is_retryable(status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::TOO_MANY_REQUESTS
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn delay_for(&self, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) if wait > self.delay => wait.min(MAX_RETRY_AFTER.max(self.delay)),
            _ => self.delay,
        }
    }
}
