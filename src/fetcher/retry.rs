//! Retry decisions with exponential backoff for failed listing requests.
//!
//! A failed request is classified into a [`FailureType`]; the
//! [`RetryPolicy`] then decides whether another attempt is worthwhile and how
//! long to wait before it.
//!
//! # Example
//!
//! ```
//! use catexplorer_core::fetcher::{FetchError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = FetchError::http_status("https://en.wikipedia.org/w/api.php", 503, None);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::FetchError;

/// Default maximum attempts per request, including the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (16 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(16);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on retry: timeouts, connection errors, 5xx responses.
    Transient,

    /// Will not succeed on retry: 4xx responses, API errors, malformed bodies.
    Permanent,

    /// The server asked us to slow down (HTTP 429 or `maxlag`).
    RateLimited,
}

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry configuration with exponential backoff.
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
///
/// Jitter is at most 500ms and never more than `base_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the base delay, keeping other settings.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));

        let delay_ms = (base_ms * multiplier.powf(exponent)).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64) + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let cap_ms = MAX_JITTER.min(self.base_delay).as_millis() as u64;
        if cap_ms == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=cap_ms);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a listing error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | Other HTTP 4xx | Permanent |
/// | Timeout, Network (non-TLS) | Transient |
/// | Network (TLS) | Permanent |
/// | API `maxlag` / `ratelimited` | RateLimited |
/// | Other API errors, Decode, NotFound, TooManyPages, InvalidRequest | Permanent |
#[instrument]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::Timeout { .. } => FailureType::Transient,
        FetchError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        FetchError::Api { code, .. } if code == "maxlag" || code == "ratelimited" => {
            FailureType::RateLimited
        }
        FetchError::Api { .. }
        | FetchError::Decode { .. }
        | FetchError::NotFound { .. }
        | FetchError::TooManyPages { .. }
        | FetchError::InvalidRequest { .. } => FailureType::Permanent,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(16));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_permanent_is_never_retried() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_transient_retries_until_exhausted() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::RateLimited, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        match policy.should_retry(FailureType::Transient, 3) {
            RetryDecision::DoNotRetry { reason } => assert!(reason.contains("exhausted")),
            RetryDecision::Retry { .. } => panic!("third failure must not retry"),
        }
    }

    #[test]
    fn test_delay_grows_exponentially_with_bounded_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10), 2.0);

        let first = policy.calculate_delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(200));

        let third = policy.calculate_delay(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(4), 2.0);
        let delay = policy.calculate_delay(8);
        assert!(delay <= Duration::from_millis(4500));
    }

    #[test]
    fn test_zero_base_delay_has_no_jitter() {
        let policy = RetryPolicy::with_max_attempts(3).with_base_delay(Duration::ZERO);
        assert_eq!(policy.calculate_delay(1), Duration::ZERO);
    }

    #[test]
    fn test_classify_http_statuses() {
        let classify = |status| classify_error(&FetchError::http_status("https://x", status, None));
        assert_eq!(classify(404), FailureType::Permanent);
        assert_eq!(classify(400), FailureType::Permanent);
        assert_eq!(classify(408), FailureType::Transient);
        assert_eq!(classify(429), FailureType::RateLimited);
        assert_eq!(classify(500), FailureType::Transient);
        assert_eq!(classify(503), FailureType::Transient);
    }

    #[test]
    fn test_classify_api_errors() {
        assert_eq!(
            classify_error(&FetchError::api("x", "maxlag", "Waiting for replicas")),
            FailureType::RateLimited
        );
        assert_eq!(
            classify_error(&FetchError::api("x", "badvalue", "nope")),
            FailureType::Permanent
        );
    }

    #[test]
    fn test_classify_timeout_and_decode() {
        assert_eq!(classify_error(&FetchError::timeout("https://x")), FailureType::Transient);
        assert_eq!(
            classify_error(&FetchError::decode("x", "missing field")),
            FailureType::Permanent
        );
    }
}
