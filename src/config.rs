//! Runtime configuration for the explorer and the MediaWiki fetcher.
//!
//! Both structs carry working defaults; the CLI layers file values and flags
//! on top and calls `validate` before building anything.

use std::time::Duration;

use thiserror::Error;

use crate::fetcher::{DEFAULT_API_URL_TEMPLATE, DEFAULT_MAX_CONTINUATIONS, DEFAULT_MAX_RETRIES};
use crate::user_agent;

/// Default prefetch depth below the expanded node.
pub const DEFAULT_DEPTH_LIMIT: usize = 1;

/// Largest accepted prefetch depth.
pub const MAX_DEPTH_LIMIT: usize = 5;

/// Default wiki language code.
pub const DEFAULT_LOCALE: &str = "en";

/// Default minimum delay between requests to one host.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_RATE_LIMIT: Duration = Duration::from_secs(60);
const MAX_RETRIES_LIMIT: u32 = 10;

/// Errors raised when a configuration value is out of range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric value is outside its accepted range.
    #[error("invalid value for `{field}`: {value}\n  Suggestion: Expected range: {expected}")]
    OutOfRange {
        /// Config key.
        field: &'static str,
        /// Offending value as written.
        value: String,
        /// Accepted range, human readable.
        expected: &'static str,
    },

    /// A string value is malformed.
    #[error("invalid value for `{field}`: '{value}'\n  Suggestion: {suggestion}")]
    Malformed {
        /// Config key.
        field: &'static str,
        /// Offending value.
        value: String,
        /// How to fix it.
        suggestion: &'static str,
    },
}

impl ConfigError {
    fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Knobs of the exploration engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// Wiki language code passed to every fetch.
    pub locale: String,
    /// How many levels below an expanded node are fetched speculatively.
    pub depth_limit: usize,
    /// Whether listings include articles (folded into node metadata).
    pub include_metadata: bool,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            depth_limit: DEFAULT_DEPTH_LIMIT,
            include_metadata: true,
        }
    }
}

impl ExplorerConfig {
    /// Checks the locale code and depth limit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty or malformed locale, or a depth
    /// limit above [`MAX_DEPTH_LIMIT`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_locale(&self.locale) {
            return Err(ConfigError::Malformed {
                field: "locale",
                value: self.locale.clone(),
                suggestion: "Use a wiki language code such as 'en', 'de' or 'zh-yue'",
            });
        }
        if self.depth_limit > MAX_DEPTH_LIMIT {
            return Err(ConfigError::out_of_range("depth_limit", self.depth_limit, "0..=5"));
        }
        Ok(())
    }
}

/// True for lowercase wiki language codes like `en`, `simple` or `zh-min-nan`.
#[must_use]
pub fn is_valid_locale(locale: &str) -> bool {
    let mut chars = locale.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Transport settings for [`MediaWikiFetcher`](crate::fetcher::MediaWikiFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// API endpoint; `{locale}` is replaced with the wiki language code.
    pub api_url_template: String,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
    /// Attempts per request, including the first.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Minimum delay between requests to one host. Zero disables limiting.
    pub rate_limit: Duration,
    /// Continuation requests allowed per listing before giving up.
    pub max_continuations: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            api_url_template: DEFAULT_API_URL_TEMPLATE.to_string(),
            user_agent: user_agent::default_user_agent(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            rate_limit: DEFAULT_RATE_LIMIT,
            max_continuations: DEFAULT_MAX_CONTINUATIONS,
        }
    }
}

impl FetcherConfig {
    /// Checks ranges and the API URL template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sample_url = self.api_url_template.replace("{locale}", DEFAULT_LOCALE);
        let scheme_ok = url::Url::parse(&sample_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !scheme_ok {
            return Err(ConfigError::Malformed {
                field: "api_url",
                value: self.api_url_template.clone(),
                suggestion: "Use an http(s) URL such as https://{locale}.wikipedia.org/w/api.php",
            });
        }
        if !(1..=MAX_RETRIES_LIMIT).contains(&self.max_retries) {
            return Err(ConfigError::out_of_range("max_retries", self.max_retries, "1..=10"));
        }
        if self.rate_limit > MAX_RATE_LIMIT {
            return Err(ConfigError::out_of_range(
                "rate_limit",
                self.rate_limit.as_millis(),
                "0..=60000 (milliseconds)",
            ));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(ConfigError::out_of_range(
                "timeout",
                0,
                "1..=3600 (seconds)",
            ));
        }
        if self.max_continuations == 0 {
            return Err(ConfigError::out_of_range("max_continuations", 0, "1..=1000"));
        }
        Ok(())
    }

    /// Resolves the API endpoint for a wiki language code.
    #[must_use]
    pub fn api_url_for(&self, locale: &str) -> String {
        self.api_url_template.replace("{locale}", locale)
    }
}
