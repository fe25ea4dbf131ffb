//! Per-host rate limiting for listing requests.
//!
//! Category exploration fans out into many small API calls against a single
//! wiki host. [`RateLimiter`] enforces a minimum delay between requests to the
//! same host; requests to different hosts do not wait for each other.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use catexplorer_core::fetcher::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_millis(100));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://en.wikipedia.org/w/api.php").await;
//!
//! // Second request to the same host waits for the delay
//! limiter.acquire("https://en.wikipedia.org/w/api.php").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per host (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value honored (10 minutes).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// Per-host rate limiter, shareable across tasks.
///
/// Per-host state lives in a `DashMap`; the timing state of each host sits
/// behind a `tokio::sync::Mutex` so check-and-update is atomic.
#[derive(Debug)]
pub struct RateLimiter {
    default_delay: Duration,
    disabled: bool,
    /// Arc lets us drop the `DashMap` shard lock before awaiting the inner Mutex.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// `None` until the first request to this host.
    last_request: Mutex<Option<Instant>>,
    cumulative_delay_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a rate limiter with the given minimum delay per host.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            default_delay,
            disabled: default_delay.is_zero(),
            hosts: DashMap::new(),
        }
    }

    /// Creates a rate limiter that never delays.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            default_delay: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the minimum delay between requests to the same host.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Waits until a request to `url`'s host is allowed, then records it.
    ///
    /// The first request to any host proceeds immediately.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let host = extract_host(url);
        tracing::Span::current().record("host", &host);

        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone();

        let mut last_request_guard = state.last_request.lock().await;

        if let Some(last_request) = *last_request_guard {
            let elapsed = last_request.elapsed();
            if elapsed < self.default_delay {
                let delay = self.default_delay.saturating_sub(elapsed);
                let cumulative = state.add_cumulative_delay(delay);

                debug!(
                    host = %host,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );
                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        host = %host,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive rate limiting - consider lowering the prefetch depth"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        }

        *last_request_guard = Some(Instant::now());
    }
}

/// Extracts the lowercased host from a URL, or `"unknown"` when unparsable.
///
/// ```
/// use catexplorer_core::fetcher::extract_host;
///
/// assert_eq!(extract_host("https://EN.wikipedia.org/w/api.php"), "en.wikipedia.org");
/// assert_eq!(extract_host("http://127.0.0.1:8080/w/api.php"), "127.0.0.1");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value (integer seconds or HTTP-date).
///
/// Returns `None` for unparsable or negative values and caps long waits at
/// ten minutes.
///
/// ```
/// use std::time::Duration;
/// use catexplorer_core::fetcher::parse_retry_after;
///
/// assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(datetime) => Some(
            datetime
                .duration_since(std::time::SystemTime::now())
                .map_or(Duration::ZERO, |duration| duration.min(MAX_RETRY_AFTER)),
        ),
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_new_creates_with_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        assert_eq!(limiter.default_delay(), Duration::from_millis(500));
        assert!(!limiter.is_disabled());
    }

    #[test]
    fn test_rate_limiter_zero_delay_is_disabled() {
        assert!(RateLimiter::new(Duration::ZERO).is_disabled());
        assert!(RateLimiter::disabled().is_disabled());
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled_no_delay() {
        tokio::time::pause();

        let limiter = RateLimiter::disabled();
        let start = Instant::now();
        limiter.acquire("https://en.wikipedia.org/1").await;
        limiter.acquire("https://en.wikipedia.org/2").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_rate_limiter_delays_same_host() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("https://en.wikipedia.org/w/api.php").await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire("https://en.wikipedia.org/w/api.php?x=1").await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_rate_limiter_hosts_independent() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire("https://en.wikipedia.org/w/api.php").await;

        let start = Instant::now();
        limiter.acquire("https://de.wikipedia.org/w/api.php").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_extract_host_with_port() {
        assert_eq!(extract_host("https://example.org:8443/w/api.php"), "example.org");
    }

    #[test]
    fn test_parse_retry_after_negative() {
        assert_eq!(parse_retry_after("-3"), None);
    }

    #[test]
    fn test_parse_retry_after_capped() {
        assert_eq!(parse_retry_after("86400"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }
}
