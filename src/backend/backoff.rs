//! Transport-level retry delays for backend calls.
//!
//! Independent of the extraction retry loop: backoff absorbs transient HTTP
//! failures (429, 5xx, dropped connections) within a single oracle call.

use std::time::Duration;

/// Exponential backoff with jitter.
///
/// ```
/// use report_extract::backend::BackoffConfig;
///
/// assert_eq!(BackoffConfig::none().max_retries, 0);
/// assert_eq!(BackoffConfig::standard().max_retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Retries after the first call. 0 disables backoff.
    pub max_retries: u32,

    pub initial_delay: Duration,

    /// Growth factor per retry.
    pub multiplier: f64,

    /// Upper bound on a single delay.
    pub max_delay: Duration,

    pub jitter: JitterStrategy,

    /// HTTP statuses treated as transient.
    pub retryable_statuses: Vec<u16>,

    /// Prefer a provider's `Retry-After` over the computed delay.
    pub respect_retry_after: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry; suits a local Ollama.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// 3 retries, 1s initial, doubling, 30s cap, full jitter.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Delay before retry number `attempt + 1` (0-indexed):
    /// `initial_delay * multiplier^attempt`, capped, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };
        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}
